//! # askdocs
//!
//! Local, offline question answering over a personal PDF library.
//!
//! Documents dropped into a folder are extracted (with OCR for scanned PDFs),
//! chunked, embedded by a local Ollama model, and stored in a SQLite vector
//! index. Questions are answered by retrieving the closest chunks and
//! grounding a chat model's answer in them.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────────┐   ┌──────────┐
//! │  docs/   │──▶│ Extract → Chunk →    │──▶│  SQLite   │
//! │ (watch)  │   │ Dedup → Embed        │   │  vectors  │
//! └──────────┘   └──────────────────────┘   └────┬─────┘
//!                                                │
//!                 ┌──────────────────────────────┘
//!                 ▼
//!          ┌──────────────┐   ┌──────────┐   ┌──────────┐
//!          │   Retrieve   │──▶│ Assemble │──▶│   Chat   │
//!          └──────────────┘   └──────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ollama serve
//! askdocs ingest                # index ./docs
//! askdocs watch                 # keep indexing new files
//! askdocs ask "What does the warranty cover?" --show-context
//! askdocs chat
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Fatal vs recoverable error taxonomy |
//! | [`chunk`] | Overlapping character windows |
//! | [`extract`] | Text extraction with OCR fallback |
//! | [`state`] | Per-document ingestion timestamps |
//! | [`ingest`] | Incremental ingestion pipeline, scan, prune |
//! | [`watch`] | Folder watching with settle detection |
//! | [`embedding`] | Embedding/chat capabilities and the Ollama client |
//! | [`index`] | Vector index trait, SQLite and in-memory backends |
//! | [`retrieve`] | Query embedding and nearest-neighbour search |
//! | [`context`] | Context assembly under a character budget |
//! | [`answer`] | Prompt construction and answer generation |
//! | [`chat`] | Interactive session |
//! | [`startup`] | Fatal startup checks and wiring |
//! | [`status`] | Index overview output |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod answer;
pub mod chat;
pub mod chunk;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod retrieve;
pub mod startup;
pub mod state;
pub mod status;
pub mod watch;
