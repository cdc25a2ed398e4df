//! TOML configuration for `askdocs`.
//!
//! Every section has defaults, so an empty file (or no file at all) yields a
//! working local setup: PDFs in `./docs`, the index in `./db`, and Ollama on
//! `localhost:11434`.

use anyhow::{bail, Context, Result};
use globset::Glob;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Logical collection name inside the vector index.
pub const COLLECTION_NAME: &str = "documents";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    #[serde(default = "default_docs_dir")]
    pub docs_dir: PathBuf,
    #[serde(default = "default_db_dir")]
    pub db_dir: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub recursive: bool,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            docs_dir: default_docs_dir(),
            db_dir: default_db_dir(),
            include_globs: default_include_globs(),
            recursive: false,
        }
    }
}

impl PathsConfig {
    /// SQLite file backing the vector index.
    pub fn index_path(&self) -> PathBuf {
        self.db_dir.join("index.sqlite")
    }

    /// JSON file holding per-document ingestion timestamps.
    pub fn state_path(&self) -> PathBuf {
        self.db_dir.join("ingest_state.json")
    }
}

fn default_docs_dir() -> PathBuf {
    PathBuf::from("docs")
}
fn default_db_dir() -> PathBuf {
    PathBuf::from("db")
}
fn default_include_globs() -> Vec<String> {
    vec!["*.pdf".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: default_chunk_size(),
            overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    800
}
fn default_chunk_overlap() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Pause between chunk embeddings, to go easy on the local model server.
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_settle_poll_ms")]
    pub settle_poll_ms: u64,
    #[serde(default = "default_settle_timeout_ms")]
    pub settle_timeout_ms: u64,
    #[serde(default = "default_true")]
    pub ocr: bool,
    #[serde(default = "default_ocr_command")]
    pub ocr_command: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_delay_ms: default_chunk_delay_ms(),
            debounce_ms: default_debounce_ms(),
            settle_poll_ms: default_settle_poll_ms(),
            settle_timeout_ms: default_settle_timeout_ms(),
            ocr: true,
            ocr_command: default_ocr_command(),
        }
    }
}

fn default_chunk_delay_ms() -> u64 {
    50
}
fn default_debounce_ms() -> u64 {
    1000
}
fn default_settle_poll_ms() -> u64 {
    250
}
fn default_settle_timeout_ms() -> u64 {
    30_000
}
fn default_true() -> bool {
    true
}
fn default_ocr_command() -> String {
    "ocrmypdf".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_model_url")]
    pub url: String,
    #[serde(default = "default_embed_model")]
    pub embed_model: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            url: default_model_url(),
            embed_model: default_embed_model(),
            chat_model: default_chat_model(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_model_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_embed_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_chat_model() -> String {
    "llama3.1:8b".to_string()
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_max_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_context_chars: default_max_context_chars(),
        }
    }
}

fn default_top_k() -> usize {
    4
}
fn default_max_context_chars() -> usize {
    4000
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Load and validate a config file. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        let config = Config::default();
        validate(&config)?;
        return Ok(config);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate config text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.size == 0 {
        bail!("chunking.size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.size {
        bail!(
            "chunking.overlap ({}) must be smaller than chunking.size ({})",
            config.chunking.overlap,
            config.chunking.size
        );
    }

    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.max_context_chars == 0 {
        bail!("retrieval.max_context_chars must be > 0");
    }

    if config.paths.include_globs.is_empty() {
        bail!("paths.include_globs must list at least one pattern");
    }
    for pattern in &config.paths.include_globs {
        Glob::new(pattern).with_context(|| format!("Invalid include glob: '{}'", pattern))?;
    }

    Ok(())
}
