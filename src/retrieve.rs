//! Query-time nearest-neighbour retrieval.

use std::sync::Arc;

use tracing::debug;

use crate::embedding::Embedder;
use crate::error::QueryError;
use crate::index::VectorIndex;
use crate::models::Retrieval;

pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
}

impl Retriever {
    pub fn new(index: Arc<dyn VectorIndex>, embedder: Arc<dyn Embedder>) -> Self {
        Self { index, embedder }
    }

    /// Top-`k` chunks for `query`, most relevant first.
    ///
    /// An empty index yields an empty [`Retrieval`] without calling the
    /// embedder. Embedding or index failures are errors, so callers can tell
    /// "nothing matched" apart from "could not search".
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Retrieval, QueryError> {
        let count = self
            .index
            .count()
            .await
            .map_err(|e| QueryError::Index(format!("{:#}", e)))?;
        if count == 0 || k == 0 {
            return Ok(Retrieval::default());
        }

        let vector = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| QueryError::Embedding(format!("{:#}", e)))?;

        let matches = self
            .index
            .query(&vector, k)
            .await
            .map_err(|e| QueryError::Index(format!("{:#}", e)))?;

        debug!(k, found = matches.len(), "retrieved chunks");
        Ok(Retrieval::new(matches))
    }
}
