//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the only view the pipelines have of chunk
//! storage. Two backends implement it:
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`SqliteIndex`] | persistent index under the configured `db_dir` |
//! | [`InMemoryIndex`] | tests and throwaway runs |
//!
//! Implementations own their own concurrency control; callers add no locking.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ChunkRecord, IndexMatch};

pub use memory::InMemoryIndex;
pub use sqlite::SqliteIndex;

/// A nearest-neighbour store of chunk vectors with text and metadata.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](VectorIndex::upsert) | Insert or replace one chunk record |
/// | [`get`](VectorIndex::get) | Which of the given ids already exist |
/// | [`query`](VectorIndex::query) | Top-`k` matches, most similar first |
/// | [`count`](VectorIndex::count) | Number of stored chunks |
/// | [`filenames`](VectorIndex::filenames) | Distinct source files |
/// | [`delete_by_filename`](VectorIndex::delete_by_filename) | Drop a file's chunks |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Logical collection this handle reads and writes.
    fn collection(&self) -> &str;

    async fn upsert(&self, record: &ChunkRecord) -> Result<()>;

    /// Returns the subset of `ids` present in the index.
    async fn get(&self, ids: &[String]) -> Result<Vec<String>>;

    /// Ranked nearest neighbours of `vector`. Returns at most `k` matches and
    /// an empty list for an empty index.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<IndexMatch>>;

    async fn count(&self) -> Result<usize>;

    async fn filenames(&self) -> Result<Vec<String>>;

    /// Removes every chunk of `filename`, returning how many were removed.
    async fn delete_by_filename(&self, filename: &str) -> Result<usize>;

    async fn contains(&self, id: &str) -> Result<bool> {
        Ok(!self.get(&[id.to_string()]).await?.is_empty())
    }
}

/// Sort matches by descending score and keep the best `k`.
pub(crate) fn rank(mut matches: Vec<IndexMatch>, k: usize) -> Vec<IndexMatch> {
    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    matches.truncate(k);
    matches
}
