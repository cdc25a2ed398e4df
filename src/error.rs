//! Error taxonomy.
//!
//! Failures fall into three groups with different blast radius:
//!
//! | Type | Scope | Handling |
//! |------|-------|----------|
//! | [`StartupError`] | whole process | print and exit non-zero |
//! | [`IngestError`] | one document | log, leave state untouched, keep watching |
//! | [`QueryError`] | one question | render "no answer", keep the session |
//!
//! Per-chunk embedding failures never surface as errors at all; they are
//! counted in [`IngestReport::failed`](crate::models::IngestReport).

use thiserror::Error;

/// Conditions that abort the process.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("model runtime not responding at {url} ({reason}). Start it with `ollama serve`.")]
    ModelUnreachable { url: String, reason: String },

    #[error("failed to open vector index at {path}: {reason}")]
    IndexUnavailable { path: String, reason: String },

    #[error("the index is empty. Run `askdocs ingest` first to add documents.")]
    EmptyIndex,

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Failure while ingesting a single document.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("ingestion state store: {0}")]
    State(String),

    #[error("vector index: {0}")]
    Index(String),
}

/// Failure while answering a single question.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query embedding failed: {0}")]
    Embedding(String),

    #[error("vector index query failed: {0}")]
    Index(String),

    #[error("no relevant context found")]
    NoContext,

    #[error("answer generation failed: {0}")]
    Generation(String),
}

impl StartupError {
    pub fn is_fatal(&self) -> bool {
        true
    }
}

impl IngestError {
    pub fn is_fatal(&self) -> bool {
        false
    }
}

impl QueryError {
    pub fn is_fatal(&self) -> bool {
        false
    }
}
