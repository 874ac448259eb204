//! Text embeddings.
//!
//! [`EmbeddingClient`] calls an OpenAI-compatible `/embeddings` endpoint,
//! which Ollama serves under `/v1` as well.  [`CachedEmbedder`] memoizes any
//! embedder in a [`CacheLayer`], so route examples and repeated inputs are
//! embedded once.

use std::sync::Arc;
use std::time::Duration;

use ailab_store::CacheLayer;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use serde_json::{Value, json};

use crate::error::{AgentError, Result};
use crate::llm::client::OLLAMA_BASE_URL;

/// Default embedding model served by a local Ollama.
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";

/// A text embedding model.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    fn model_id(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, preserving order.  The default embeds one by one.
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// OpenAI-compatible embeddings endpoint.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl EmbeddingClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| AgentError::EmbeddingFailed {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            model: model.into(),
            api_key: None,
        })
    }

    /// `nomic-embed-text` on the local Ollama.
    pub fn ollama_default() -> Result<Self> {
        Self::new(OLLAMA_BASE_URL, DEFAULT_EMBEDDING_MODEL)
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into()).filter(|k| !k.is_empty());
        self
    }

    async fn request(&self, input: Value) -> Result<Value> {
        let url = format!("{}/embeddings", self.base_url);
        let mut req = self
            .http
            .post(&url)
            .json(&json!({ "model": self.model, "input": input }));
        if let Some(key) = &self.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {key}")).map_err(|e| {
                AgentError::EmbeddingFailed {
                    reason: format!("invalid authorization header: {e}"),
                }
            })?;
            req = req.header(AUTHORIZATION, value);
        }

        tracing::debug!(url = %url, model = %self.model, "sending embedding request");
        let resp = req.send().await.map_err(|e| AgentError::EmbeddingFailed {
            reason: e.to_string(),
        })?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(AgentError::EmbeddingFailed {
                reason: format!("API returned {status}: {text}"),
            });
        }
        serde_json::from_str(&text).map_err(|e| AgentError::EmbeddingFailed {
            reason: format!("invalid JSON response: {e}"),
        })
    }
}

/// Read `data[*].embedding`, ordered by each item's `index`.
fn parse_embeddings(v: &Value, expected: usize) -> Result<Vec<Vec<f32>>> {
    let data = v["data"].as_array().ok_or_else(|| AgentError::EmbeddingFailed {
        reason: "missing `data` array in response".into(),
    })?;

    let mut items: Vec<(u64, Vec<f32>)> = data
        .iter()
        .enumerate()
        .map(|(pos, item)| {
            let vector = item["embedding"]
                .as_array()
                .ok_or_else(|| AgentError::EmbeddingFailed {
                    reason: format!("item {pos} has no `embedding`"),
                })?
                .iter()
                .map(|x| x.as_f64().unwrap_or(0.0) as f32)
                .collect();
            Ok((item["index"].as_u64().unwrap_or(pos as u64), vector))
        })
        .collect::<Result<_>>()?;

    if items.len() != expected {
        return Err(AgentError::EmbeddingFailed {
            reason: format!("expected {expected} embeddings, got {}", items.len()),
        });
    }
    items.sort_by_key(|(index, _)| *index);
    Ok(items.into_iter().map(|(_, v)| v).collect())
}

#[async_trait]
impl EmbeddingModel for EmbeddingClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let v = self.request(json!(text)).await?;
        parse_embeddings(&v, 1)?
            .pop()
            .ok_or_else(|| AgentError::EmbeddingFailed {
                reason: "empty embedding response".into(),
            })
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let v = self.request(json!(texts)).await?;
        parse_embeddings(&v, texts.len())
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Memoizing wrapper keyed by `model_id` and text.
pub struct CachedEmbedder {
    inner: Arc<dyn EmbeddingModel>,
    cache: CacheLayer<Vec<f32>>,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn EmbeddingModel>, capacity: u64, ttl_secs: u64) -> Self {
        Self {
            cache: CacheLayer::builder(format!("embeddings:{}", inner.model_id()))
                .max_capacity(capacity)
                .ttl_seconds(ttl_secs)
                .build(),
            inner,
        }
    }

    pub fn cache(&self) -> &CacheLayer<Vec<f32>> {
        &self.cache
    }

    fn key(&self, text: &str) -> String {
        format!("{}\u{1f}{text}", self.inner.model_id())
    }
}

#[async_trait]
impl EmbeddingModel for CachedEmbedder {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = self.key(text);
        self.cache
            .get_or_try_insert_with(&key, || self.inner.embed(text))
            .await
    }
}
