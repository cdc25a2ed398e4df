//! Process startup: verify collaborators and build the pipelines.
//!
//! Every check here is fatal. Callers print the [`StartupError`] and exit
//! non-zero rather than limping along without a model runtime or index.

use std::sync::Arc;

use tracing::info;

use crate::answer::AnswerGenerator;
use crate::config::{Config, COLLECTION_NAME};
use crate::embedding::{ModelRuntime, OllamaClient};
use crate::error::StartupError;
use crate::extract::{Extractor, OcrEngine, OcrMyPdf};
use crate::index::{SqliteIndex, VectorIndex};
use crate::ingest::{IngestPipeline, IngestSettings};
use crate::retrieve::Retriever;
use crate::state::StateStore;

/// Liveness probe: the runtime must answer a model listing.
pub async fn verify_runtime(runtime: &dyn ModelRuntime, url: &str) -> Result<Vec<String>, StartupError> {
    let models = runtime
        .list_models()
        .await
        .map_err(|e| StartupError::ModelUnreachable {
            url: url.to_string(),
            reason: format!("{:#}", e),
        })?;
    info!(url, models = models.len(), "model runtime reachable");
    Ok(models)
}

/// Open (or create) the persistent index under `db_dir`.
pub async fn open_index(config: &Config) -> Result<SqliteIndex, StartupError> {
    let path = config.paths.index_path();
    SqliteIndex::open(&path, COLLECTION_NAME)
        .await
        .map_err(|e| StartupError::IndexUnavailable {
            path: path.display().to_string(),
            reason: format!("{:#}", e),
        })
}

/// Query processes refuse to start on an empty index.
pub async fn require_documents(index: &dyn VectorIndex) -> Result<usize, StartupError> {
    let count = index
        .count()
        .await
        .map_err(|e| StartupError::IndexUnavailable {
            path: index.collection().to_string(),
            reason: format!("{:#}", e),
        })?;
    if count == 0 {
        return Err(StartupError::EmptyIndex);
    }
    Ok(count)
}

/// Connected Ollama client, verified live.
pub async fn connect_models(config: &Config) -> Result<Arc<OllamaClient>, StartupError> {
    let client = OllamaClient::new(&config.model).map_err(|e| StartupError::Config(format!("{:#}", e)))?;
    verify_runtime(&client, client.url()).await?;
    Ok(Arc::new(client))
}

pub fn build_extractor(config: &Config) -> Extractor {
    let ocr: Option<Arc<dyn OcrEngine>> = if config.ingest.ocr {
        Some(Arc::new(OcrMyPdf::new(config.ingest.ocr_command.clone())))
    } else {
        None
    };
    Extractor::new(ocr)
}

/// Everything an ingesting process needs: live runtime, open index, state.
pub async fn ingest_pipeline(config: &Config) -> Result<IngestPipeline, StartupError> {
    let models = connect_models(config).await?;
    let index: Arc<dyn VectorIndex> = Arc::new(open_index(config).await?);
    Ok(IngestPipeline::new(
        index,
        models,
        build_extractor(config),
        StateStore::new(config.paths.state_path()),
        IngestSettings::from_config(config),
    ))
}

/// Pipeline for maintenance commands that never embed (e.g. `prune`).
/// Skips the runtime liveness probe.
pub async fn offline_pipeline(config: &Config) -> Result<IngestPipeline, StartupError> {
    let client = OllamaClient::new(&config.model).map_err(|e| StartupError::Config(format!("{:#}", e)))?;
    let index: Arc<dyn VectorIndex> = Arc::new(open_index(config).await?);
    Ok(IngestPipeline::new(
        index,
        Arc::new(client),
        build_extractor(config),
        StateStore::new(config.paths.state_path()),
        IngestSettings::from_config(config),
    ))
}

/// Everything a querying process needs: live runtime and a non-empty index.
pub async fn answer_generator(config: &Config) -> Result<AnswerGenerator, StartupError> {
    let models = connect_models(config).await?;
    let index: Arc<dyn VectorIndex> = Arc::new(open_index(config).await?);
    let count = require_documents(index.as_ref()).await?;
    info!(chunks = count, "index ready");

    let retriever = Retriever::new(index, models.clone());
    Ok(AnswerGenerator::new(
        retriever,
        models,
        config.retrieval.top_k,
        config.retrieval.max_context_chars,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::InMemoryIndex;
    use anyhow::{bail, Result};
    use async_trait::async_trait;

    struct DeadRuntime;

    #[async_trait]
    impl ModelRuntime for DeadRuntime {
        async fn list_models(&self) -> Result<Vec<String>> {
            bail!("connection refused")
        }
    }

    #[tokio::test]
    async fn unreachable_runtime_is_fatal() {
        let err = verify_runtime(&DeadRuntime, "http://127.0.0.1:9").await.unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, StartupError::ModelUnreachable { .. }));
    }

    #[tokio::test]
    async fn empty_index_is_fatal_for_queries() {
        let index = InMemoryIndex::new();
        assert!(matches!(
            require_documents(&index).await,
            Err(StartupError::EmptyIndex)
        ));
    }

    #[tokio::test]
    async fn index_opens_under_db_dir() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.db_dir = tmp.path().join("db");
        let index = open_index(&config).await.unwrap();
        assert_eq!(index.collection(), COLLECTION_NAME);
        assert!(config.paths.index_path().exists());
    }
}
