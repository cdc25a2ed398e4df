//! In-memory [`VectorIndex`] for tests and throwaway runs.
//!
//! Records live in a `Vec` behind `std::sync::RwLock`, in insertion order.
//! Search is brute-force cosine similarity over every stored vector.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::config::COLLECTION_NAME;
use crate::embedding::cosine_similarity;
use crate::models::{ChunkRecord, IndexMatch};

use super::{rank, VectorIndex};

pub struct InMemoryIndex {
    collection: String,
    records: RwLock<Vec<ChunkRecord>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::with_collection(COLLECTION_NAME)
    }

    pub fn with_collection(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            records: RwLock::new(Vec::new()),
        }
    }

    /// Snapshot of every stored record, in insertion order.
    pub fn records(&self) -> Result<Vec<ChunkRecord>> {
        Ok(self.read()?.clone())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<ChunkRecord>>> {
        self.records
            .read()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<ChunkRecord>>> {
        self.records
            .write()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn upsert(&self, record: &ChunkRecord) -> Result<()> {
        let mut records = self.write()?;
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        Ok(())
    }

    async fn get(&self, ids: &[String]) -> Result<Vec<String>> {
        let records = self.read()?;
        Ok(ids
            .iter()
            .filter(|id| records.iter().any(|r| &r.id == *id))
            .cloned()
            .collect())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<IndexMatch>> {
        let records = self.read()?;
        let matches = records
            .iter()
            .map(|r| IndexMatch {
                id: r.id.clone(),
                text: r.text.clone(),
                metadata: r.metadata.clone(),
                score: cosine_similarity(vector, &r.vector),
            })
            .collect();
        Ok(rank(matches, k))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    async fn filenames(&self) -> Result<Vec<String>> {
        let records = self.read()?;
        let mut names: Vec<String> = records.iter().map(|r| r.metadata.filename.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn delete_by_filename(&self, filename: &str) -> Result<usize> {
        let mut records = self.write()?;
        let before = records.len();
        records.retain(|r| r.metadata.filename != filename);
        Ok(before - records.len())
    }
}
