//! On-disk ingestion state: file name → modification time of the last
//! successful ingest.
//!
//! The state is a single pretty-printed JSON object. Writes go to a sibling
//! temp file that is then renamed over the original, so a crash mid-write
//! leaves the previous state intact.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::sync::Mutex;

/// Filename → last ingested modification time (seconds since the epoch).
pub type IngestState = BTreeMap<String, f64>;

pub struct StateStore {
    path: PathBuf,
    // Serialises load-modify-save cycles within this process.
    write_lock: Mutex<()>,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the state. A missing file is an empty state.
    pub fn load(&self) -> Result<IngestState> {
        if !self.path.exists() {
            return Ok(IngestState::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read state file: {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(IngestState::new());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", self.path.display()))
    }

    /// Replace the state on disk (write to temp, then rename).
    pub fn save(&self, state: &IngestState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(state)?;
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write state file: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace state file: {}", self.path.display()))?;
        Ok(())
    }

    /// Recorded modification time for `filename`, if any.
    pub fn last_ingested(&self, filename: &str) -> Result<Option<f64>> {
        Ok(self.load()?.get(filename).copied())
    }

    /// Whether a document with modification time `mtime` needs processing.
    /// Only a strictly newer timestamp counts.
    pub fn is_stale(&self, filename: &str, mtime: f64) -> Result<bool> {
        Ok(match self.last_ingested(filename)? {
            Some(recorded) => mtime > recorded,
            None => true,
        })
    }

    /// Record a successful ingest of `filename` at `mtime`.
    pub async fn record(&self, filename: &str, mtime: f64) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.load()?;
        state.insert(filename.to_string(), mtime);
        self.save(&state)
    }

    /// Drop `filename` from the state. Returns whether it was present.
    pub async fn forget(&self, filename: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.load()?;
        let removed = state.remove(filename).is_some();
        if removed {
            self.save(&state)?;
        }
        Ok(removed)
    }
}
