//! Model runtime boundary: embeddings, chat, and liveness.
//!
//! The pipelines only see two capabilities, [`Embedder`] and [`ChatModel`].
//! [`OllamaClient`] implements both against a local Ollama server, plus the
//! [`ModelRuntime`] liveness probe used once at startup.
//!
//! Also provides the vector helpers used by the SQLite index:
//! - [`cosine_similarity`]
//! - [`vec_to_blob`] / [`blob_to_vec`]
//!
//! # Retry Strategy
//!
//! HTTP calls use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::ModelConfig;

/// Turns text into a fixed-dimension vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"nomic-embed-text"`).
    fn model_name(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Single-turn text generation.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn chat(&self, prompt: &str) -> Result<String>;
}

/// Liveness probe for the process that owns the model runtime.
#[async_trait]
pub trait ModelRuntime: Send + Sync {
    /// Lists models available on the runtime. Any error means "unreachable".
    async fn list_models(&self) -> Result<Vec<String>>;
}

/// HTTP client for a local Ollama server.
pub struct OllamaClient {
    http: reqwest::Client,
    url: String,
    embed_model: String,
    chat_model: String,
    max_retries: u32,
}

impl OllamaClient {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            url: config.url.trim_end_matches('/').to_string(),
            embed_model: config.embed_model.clone(),
            chat_model: config.chat_model.clone(),
            max_retries: config.max_retries,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST a JSON body with retry/backoff and return the parsed response.
    async fn post_json(&self, path: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        let endpoint = format!("{}{}", self.url, path);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(attempt, ?delay, endpoint = %endpoint, "retrying Ollama request");
                tokio::time::sleep(delay).await;
            }

            let resp = self.http.post(&endpoint).json(body).send().await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response.json().await?);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow!("Ollama API error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Ollama API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(anyhow!(
                        "Ollama connection error (is Ollama running at {}?): {}",
                        self.url,
                        e
                    ));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("Ollama request failed after retries")))
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    fn model_name(&self) -> &str {
        &self.embed_model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.embed_model,
            "input": [text],
        });
        let json = self.post_json("/api/embed", &body).await?;
        parse_embed_response(&json)?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Empty embedding response"))
    }
}

#[async_trait]
impl ChatModel for OllamaClient {
    fn model_name(&self) -> &str {
        &self.chat_model
    }

    async fn chat(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.chat_model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": false,
        });
        let json = self.post_json("/api/chat", &body).await?;
        parse_chat_response(&json)
    }
}

#[async_trait]
impl ModelRuntime for OllamaClient {
    async fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .http
            .get(format!("{}/api/tags", self.url))
            .send()
            .await?
            .error_for_status()?;
        let json: serde_json::Value = response.json().await?;
        parse_tags_response(&json)
    }
}

fn parse_embed_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?;

    let mut result = Vec::with_capacity(embeddings.len());

    for embedding in embeddings {
        let vec: Vec<f32> = embedding
            .as_array()
            .ok_or_else(|| anyhow!("Invalid Ollama response: embedding is not an array"))?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        if vec.is_empty() {
            bail!("Invalid Ollama response: empty embedding");
        }
        result.push(vec);
    }

    Ok(result)
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing message.content"))
}

fn parse_tags_response(json: &serde_json::Value) -> Result<Vec<String>> {
    let models = json
        .get("models")
        .and_then(|m| m.as_array())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing models array"))?;

    Ok(models
        .iter()
        .filter_map(|m| m.get("name").and_then(|n| n.as_str()))
        .map(str::to_string)
        .collect())
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use askdocs::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB produced by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_different_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_parse_embed_response() {
        let parsed = parse_embed_response(&json!({ "embeddings": [[0.5, -1.0]] })).unwrap();
        assert_eq!(parsed, vec![vec![0.5f32, -1.0]]);
        assert!(parse_embed_response(&json!({ "embedding": [] })).is_err());
        assert!(parse_embed_response(&json!({ "embeddings": [[]] })).is_err());
    }

    #[test]
    fn test_parse_chat_response_trims() {
        let json = json!({ "message": { "role": "assistant", "content": "  Paris.\n" } });
        assert_eq!(parse_chat_response(&json).unwrap(), "Paris.");
        assert!(parse_chat_response(&json!({ "error": "model not found" })).is_err());
    }

    #[test]
    fn test_parse_tags_response() {
        let json = json!({ "models": [{ "name": "nomic-embed-text:latest" }, { "name": "llama3.1:8b" }] });
        assert_eq!(
            parse_tags_response(&json).unwrap(),
            vec!["nomic-embed-text:latest", "llama3.1:8b"]
        );
    }

    #[tokio::test]
    async fn test_unreachable_runtime_errors() {
        let config = ModelConfig {
            url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 2,
            max_retries: 0,
            ..ModelConfig::default()
        };
        let client = OllamaClient::new(&config).unwrap();
        assert!(client.list_models().await.is_err());
        assert!(client.embed("hello").await.is_err());
    }
}
