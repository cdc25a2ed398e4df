//! Core data types that flow through the ingestion and question-answering
//! pipelines.

use serde::{Deserialize, Serialize};

/// Metadata stored with every chunk in the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Source document file name (e.g. `report.pdf`).
    pub filename: String,
    pub chunk_index: i64,
    /// Wall-clock time of ingestion, seconds since the Unix epoch.
    pub timestamp: f64,
}

/// A chunk of extracted document text, before embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Deterministic id: `{stem}::chunk_{index}`.
    pub id: String,
    pub chunk_index: i64,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

/// Everything the index stores for one chunk.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub hash: String,
    pub metadata: ChunkMetadata,
}

/// A ranked hit returned by a nearest-neighbour query.
#[derive(Debug, Clone)]
pub struct IndexMatch {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Similarity to the query vector; higher is more relevant.
    pub score: f32,
}

/// Ordered retrieval result for one query, most relevant first.
#[derive(Debug, Clone, Default)]
pub struct Retrieval {
    matches: Vec<IndexMatch>,
}

impl Retrieval {
    pub fn new(matches: Vec<IndexMatch>) -> Self {
        Self { matches }
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn chunks(&self) -> &[IndexMatch] {
        &self.matches
    }

    pub fn texts(&self) -> Vec<&str> {
        self.matches.iter().map(|m| m.text.as_str()).collect()
    }

    pub fn metadatas(&self) -> Vec<&ChunkMetadata> {
        self.matches.iter().map(|m| &m.metadata).collect()
    }
}

/// A generated answer and the chunks it was grounded in.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub sources: Retrieval,
}

/// How document text was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMethod {
    Direct,
    Ocr,
    /// Neither direct extraction nor OCR produced any text.
    Unreadable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedText {
    pub text: String,
    pub method: ExtractionMethod,
}

impl ExtractedText {
    pub fn unreadable() -> Self {
        Self {
            text: String::new(),
            method: ExtractionMethod::Unreadable,
        }
    }

    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Per-document ingestion counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Chunks produced by the chunker.
    pub chunks: usize,
    /// Chunks newly written to the index.
    pub added: usize,
    /// Chunks skipped because their id was already indexed.
    pub existing: usize,
    /// Chunks skipped because embedding failed.
    pub failed: usize,
}

/// What `ingest` did with a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Modification time not newer than the recorded one; nothing done.
    UpToDate,
    /// No readable text even after OCR; state left untouched for a retry.
    Unreadable,
    Ingested(IngestReport),
}

/// One question/answer exchange in an interactive session.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}
