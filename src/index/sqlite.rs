//! SQLite-backed [`VectorIndex`].
//!
//! One row per chunk in the `chunks` table, keyed by `(collection, id)`.
//! Vectors are stored as little-endian f32 BLOBs and searched brute-force
//! with cosine similarity, which is fine at personal-library scale.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::migrate;
use crate::models::{ChunkMetadata, ChunkRecord, IndexMatch};

use super::{rank, VectorIndex};

pub struct SqliteIndex {
    pool: SqlitePool,
    collection: String,
}

impl SqliteIndex {
    /// Open (creating if needed) the index file and bind to `collection`.
    pub async fn open(path: &Path, collection: &str) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self {
            pool,
            collection: collection.to_string(),
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn upsert(&self, record: &ChunkRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chunks (collection, id, filename, chunk_index, timestamp, text, hash, embedding, dims)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(collection, id) DO UPDATE SET
                filename = excluded.filename,
                chunk_index = excluded.chunk_index,
                timestamp = excluded.timestamp,
                text = excluded.text,
                hash = excluded.hash,
                embedding = excluded.embedding,
                dims = excluded.dims
            "#,
        )
        .bind(&self.collection)
        .bind(&record.id)
        .bind(&record.metadata.filename)
        .bind(record.metadata.chunk_index)
        .bind(record.metadata.timestamp)
        .bind(&record.text)
        .bind(&record.hash)
        .bind(vec_to_blob(&record.vector))
        .bind(record.vector.len() as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, ids: &[String]) -> Result<Vec<String>> {
        let mut found = Vec::new();
        for id in ids {
            let hit: Option<String> =
                sqlx::query_scalar("SELECT id FROM chunks WHERE collection = ? AND id = ?")
                    .bind(&self.collection)
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?;
            if let Some(id) = hit {
                found.push(id);
            }
        }
        Ok(found)
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<IndexMatch>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT id, filename, chunk_index, timestamp, text, embedding
            FROM chunks
            WHERE collection = ?
            ORDER BY filename, chunk_index
            "#,
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;

        let matches = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                IndexMatch {
                    id: row.get("id"),
                    text: row.get("text"),
                    metadata: ChunkMetadata {
                        filename: row.get("filename"),
                        chunk_index: row.get("chunk_index"),
                        timestamp: row.get("timestamp"),
                    },
                    score: cosine_similarity(vector, &blob_to_vec(&blob)),
                }
            })
            .collect();

        Ok(rank(matches, k))
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }

    async fn filenames(&self) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT filename FROM chunks WHERE collection = ? ORDER BY filename",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    async fn delete_by_filename(&self, filename: &str) -> Result<usize> {
        let result = sqlx::query("DELETE FROM chunks WHERE collection = ? AND filename = ?")
            .bind(&self.collection)
            .bind(filename)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }
}
