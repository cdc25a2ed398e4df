//! Incremental ingestion pipeline.
//!
//! Coordinates the per-document flow:
//! staleness check → extraction (OCR fallback) → chunking → dedup check →
//! embedding → upsert → state update.
//!
//! A document is processed only when its modification time is strictly newer
//! than the one recorded in the [`StateStore`]. Chunks whose id is already in
//! the index are never re-embedded, so re-running an interrupted or repeated
//! ingest adds nothing twice. A chunk whose embedding fails is skipped and the
//! document is still marked processed.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::chunk::chunk_document;
use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::IngestError;
use crate::extract::Extractor;
use crate::index::VectorIndex;
use crate::models::{ChunkMetadata, ChunkRecord, IngestOutcome, IngestReport};
use crate::state::StateStore;

/// Tunables for [`IngestPipeline`].
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Pause after each embedded chunk.
    pub chunk_delay: Duration,
}

impl IngestSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_size: config.chunking.size,
            chunk_overlap: config.chunking.overlap,
            chunk_delay: Duration::from_millis(config.ingest.chunk_delay_ms),
        }
    }
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Decides which files in the documents folder are ingested.
#[derive(Debug, Clone)]
pub struct DocumentFilter {
    root: PathBuf,
    set: GlobSet,
    recursive: bool,
}

impl DocumentFilter {
    pub fn new(root: impl Into<PathBuf>, include_globs: &[String], recursive: bool) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in include_globs {
            builder.add(Glob::new(pattern)?);
        }
        Ok(Self {
            root: root.into(),
            set: builder.build()?,
            recursive,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.paths.docs_dir,
            &config.paths.include_globs,
            config.paths.recursive,
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn recursive(&self) -> bool {
        self.recursive
    }

    /// Match against the path relative to the root, or the bare file name
    /// when the path lies elsewhere.
    pub fn matches(&self, path: &Path) -> bool {
        let relative = match path.strip_prefix(&self.root) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => match path.file_name() {
                Some(name) => PathBuf::from(name),
                None => return false,
            },
        };
        self.set.is_match(&relative)
    }

    /// Matching files under the root, sorted for deterministic ordering.
    pub fn list_documents(&self) -> Result<Vec<PathBuf>> {
        let mut walker = WalkDir::new(&self.root);
        if !self.recursive {
            walker = walker.max_depth(1);
        }

        let mut docs = Vec::new();
        for entry in walker {
            let entry = entry?;
            if entry.file_type().is_file() && self.matches(entry.path()) {
                docs.push(entry.into_path());
            }
        }
        docs.sort();
        Ok(docs)
    }
}

/// Counters for a batch scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub seen: usize,
    pub ingested: usize,
    pub up_to_date: usize,
    pub unreadable: usize,
    pub failed: usize,
    pub chunks_added: usize,
    /// Documents not started because the scan was asked to stop.
    pub remaining: usize,
}

/// Counters for a reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneSummary {
    pub documents_removed: usize,
    pub chunks_removed: usize,
    pub state_entries_removed: usize,
}

pub struct IngestPipeline {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    extractor: Extractor,
    state: StateStore,
    settings: IngestSettings,
}

impl IngestPipeline {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        extractor: Extractor,
        state: StateStore,
        settings: IngestSettings,
    ) -> Self {
        Self {
            index,
            embedder,
            extractor,
            state,
            settings,
        }
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    /// Ingest one document end to end.
    pub async fn ingest(&self, path: &Path) -> Result<IngestOutcome, IngestError> {
        let filename = file_name(path);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.clone());

        let mtime = modified_secs(path).map_err(|source| IngestError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let stale = self
            .state
            .is_stale(&filename, mtime)
            .map_err(|e| IngestError::State(format!("{:#}", e)))?;
        if !stale {
            debug!(file = %filename, "already up to date");
            return Ok(IngestOutcome::UpToDate);
        }
        let first_ingest = self
            .state
            .last_ingested(&filename)
            .map_err(|e| IngestError::State(format!("{:#}", e)))?
            .is_none();

        let extracted = self.extractor.extract(path).await;
        if !extracted.has_text() {
            warn!(file = %filename, "skipping: no readable text even after OCR");
            return Ok(IngestOutcome::Unreadable);
        }

        let chunks = chunk_document(
            &stem,
            &extracted.text,
            self.settings.chunk_size,
            self.settings.chunk_overlap,
        );
        info!(
            file = %filename,
            method = ?extracted.method,
            chunks = chunks.len(),
            "ingesting new or updated document"
        );

        let mut report = IngestReport {
            chunks: chunks.len(),
            ..IngestReport::default()
        };

        for chunk in &chunks {
            let exists = self
                .index
                .contains(&chunk.id)
                .await
                .map_err(|e| IngestError::Index(format!("{:#}", e)))?;
            if exists {
                debug!(chunk = %chunk.id, "already indexed");
                report.existing += 1;
                continue;
            }

            let vector = match self.embedder.embed(&chunk.text).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(chunk = %chunk.id, error = %format!("{:#}", e), "embedding failed, skipping chunk");
                    report.failed += 1;
                    continue;
                }
            };

            let record = ChunkRecord {
                id: chunk.id.clone(),
                vector,
                text: chunk.text.clone(),
                hash: chunk.hash.clone(),
                metadata: ChunkMetadata {
                    filename: filename.clone(),
                    chunk_index: chunk.chunk_index,
                    timestamp: now_secs(),
                },
            };
            self.index
                .upsert(&record)
                .await
                .map_err(|e| IngestError::Index(format!("{:#}", e)))?;
            report.added += 1;

            if !self.settings.chunk_delay.is_zero() {
                tokio::time::sleep(self.settings.chunk_delay).await;
            }
        }

        if first_ingest && report.existing > 0 {
            warn!(
                file = %filename,
                stem = %stem,
                existing = report.existing,
                "chunk ids already indexed: another document shares this stem, or an earlier ingest was interrupted"
            );
        }

        self.state
            .record(&filename, mtime)
            .await
            .map_err(|e| IngestError::State(format!("{:#}", e)))?;

        let total = self.index.count().await.unwrap_or_default();
        info!(
            file = %filename,
            added = report.added,
            existing = report.existing,
            failed = report.failed,
            index_size = total,
            "document ingested"
        );

        Ok(IngestOutcome::Ingested(report))
    }

    /// Ingest every matching document in the folder. A failing document is
    /// logged and counted; the scan continues.
    pub async fn scan(&self, filter: &DocumentFilter) -> Result<ScanSummary> {
        self.scan_while(filter, || true).await
    }

    /// Like [`scan`](Self::scan), but `keep_going` is checked before each
    /// document. Once it returns false no further document is started.
    pub async fn scan_while(
        &self,
        filter: &DocumentFilter,
        keep_going: impl Fn() -> bool,
    ) -> Result<ScanSummary> {
        let docs = filter.list_documents()?;
        Ok(self.ingest_while(&docs, keep_going).await)
    }

    /// Ingest an explicit list of files, in order.
    pub async fn ingest_all(&self, paths: &[PathBuf]) -> ScanSummary {
        self.ingest_while(paths, || true).await
    }

    /// Ingest `paths` in order until `keep_going` returns false. The document
    /// in flight always runs to completion.
    pub async fn ingest_while(&self, paths: &[PathBuf], keep_going: impl Fn() -> bool) -> ScanSummary {
        let mut summary = ScanSummary::default();
        for path in paths {
            if !keep_going() {
                summary.remaining = paths.len() - summary.seen;
                info!(remaining = summary.remaining, "stopping before remaining documents");
                break;
            }
            summary.seen += 1;
            match self.ingest(path).await {
                Ok(IngestOutcome::UpToDate) => summary.up_to_date += 1,
                Ok(IngestOutcome::Unreadable) => summary.unreadable += 1,
                Ok(IngestOutcome::Ingested(report)) => {
                    summary.ingested += 1;
                    summary.chunks_added += report.added;
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "failed to ingest document");
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    /// Remove index chunks and state entries for files no longer present in
    /// the documents folder.
    pub async fn prune(&self, filter: &DocumentFilter) -> Result<PruneSummary> {
        let present: BTreeSet<String> = filter
            .list_documents()?
            .iter()
            .map(|p| file_name(p))
            .collect();

        let mut summary = PruneSummary::default();

        for filename in self.index.filenames().await? {
            if present.contains(&filename) {
                continue;
            }
            let removed = self.index.delete_by_filename(&filename).await?;
            info!(file = %filename, chunks = removed, "pruned missing document");
            summary.documents_removed += 1;
            summary.chunks_removed += removed;
        }

        for filename in self.state.load()?.keys() {
            if !present.contains(filename) && self.state.forget(filename).await? {
                summary.state_entries_removed += 1;
            }
        }

        Ok(summary)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn modified_secs(path: &Path) -> std::io::Result<f64> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(modified
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64())
}

fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
