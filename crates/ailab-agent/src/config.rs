//! Workspace configuration.
//!
//! Loaded from a TOML or JSON file (chosen by extension), then overridden
//! by environment variables.  A missing file means all defaults.
//!
//! ```toml
//! data_dir = "data"
//! default_model = "qwen-local"
//!
//! [embedding]
//! model = "nomic-embed-text"
//!
//! [routing]
//! pass_threshold = 0.8
//! review_threshold = 0.6
//!
//! [[models]]
//! id = "gpt-4o"
//! name = "GPT-4o"
//! provider = "openai-compatible"
//! modelId = "gpt-4o"
//! baseURL = "https://api.openai.com/v1"
//! apiKeyEnv = "OPENAI_API_KEY"
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{AgentError, Result};
use crate::llm::client::OLLAMA_BASE_URL;
use crate::llm::embedding::{CachedEmbedder, DEFAULT_EMBEDDING_MODEL, EmbeddingClient};
use crate::registry::{ModelEntry, ProviderRegistry};

pub const ENV_DATA_DIR: &str = "AILAB_DATA_DIR";
pub const ENV_DEFAULT_MODEL: &str = "AILAB_DEFAULT_MODEL";
pub const ENV_EMBEDDING_MODEL: &str = "AILAB_EMBEDDING_MODEL";
pub const ENV_EMBEDDING_BASE_URL: &str = "AILAB_EMBEDDING_BASE_URL";
pub const ENV_OLLAMA_BASE_URL: &str = "OLLAMA_BASE_URL";

/// Embedding endpoint and its cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub base_url: String,
    pub model: String,
    /// Env var holding a key, for hosted endpoints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    pub cache_capacity: u64,
    pub cache_ttl_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            base_url: OLLAMA_BASE_URL.to_owned(),
            model: DEFAULT_EMBEDDING_MODEL.to_owned(),
            api_key_env: None,
            cache_capacity: 10_000,
            cache_ttl_secs: 3_600,
        }
    }
}

/// Confidence bands for threshold routing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingSettings {
    pub pass_threshold: f32,
    pub review_threshold: f32,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            pass_threshold: 0.8,
            review_threshold: 0.6,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabConfig {
    /// Root of `sessions/`, `agents/` and `chat_memory.json`.
    pub data_dir: PathBuf,
    pub default_model: String,
    /// Ollama endpoint for the `ollama` provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ollama_base_url: Option<String>,
    pub embedding: EmbeddingSettings,
    pub routing: RoutingSettings,
    /// Registered on top of the built-in models.
    pub models: Vec<ModelEntry>,
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            default_model: "qwen-local".to_owned(),
            ollama_base_url: None,
            embedding: EmbeddingSettings::default(),
            routing: RoutingSettings::default(),
            models: Vec::new(),
        }
    }
}

impl LabConfig {
    /// Load `path` (or defaults) and apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(path)?,
            Some(path) => {
                warn!(path = %path.display(), "config file does not exist, using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a file as JSON when its extension is `json`, TOML otherwise.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| AgentError::ConfigError {
            reason: format!("failed to read {}: {e}", path.display()),
        })?;
        let is_json = path.extension().and_then(|s| s.to_str()) == Some("json");
        let config = Self::parse(&content, is_json)?;
        info!(path = %path.display(), models = config.models.len(), "configuration loaded");
        Ok(config)
    }

    pub fn parse(content: &str, is_json: bool) -> Result<Self> {
        if is_json {
            serde_json::from_str(content).map_err(|e| AgentError::ConfigError {
                reason: format!("failed to parse JSON config: {e}"),
            })
        } else {
            toml::from_str(content).map_err(|e| AgentError::ConfigError {
                reason: format!("failed to parse TOML config: {e}"),
            })
        }
    }

    /// Apply overrides from `lookup` (the process environment in
    /// [`load`](Self::load)).  Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(model) = get(ENV_DEFAULT_MODEL) {
            self.default_model = model;
        }
        if let Some(model) = get(ENV_EMBEDDING_MODEL) {
            self.embedding.model = model;
        }
        if let Some(url) = get(ENV_OLLAMA_BASE_URL) {
            self.ollama_base_url = Some(url);
        }
        if let Some(url) = get(ENV_EMBEDDING_BASE_URL) {
            self.embedding.base_url = url;
        }
        debug!(data_dir = %self.data_dir.display(), default_model = %self.default_model, "effective configuration");
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir.join("sessions")
    }

    pub fn agents_dir(&self) -> PathBuf {
        self.data_dir.join("agents")
    }

    pub fn memory_file(&self) -> PathBuf {
        self.data_dir.join("chat_memory.json")
    }

    /// Registry with the built-in strategies and models plus `[[models]]`.
    pub async fn build_registry(&self) -> Result<ProviderRegistry> {
        let registry = ProviderRegistry::with_defaults(self.ollama_base_url.clone());
        for entry in &self.models {
            registry.register_model(entry.clone()).await?;
        }
        Ok(registry)
    }

    /// The configured embedding endpoint behind a cache.
    pub fn build_embedder(&self) -> Result<CachedEmbedder> {
        let settings = &self.embedding;
        let mut client = EmbeddingClient::new(&settings.base_url, &settings.model)?;
        if let Some(key) = settings
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
        {
            client = client.with_api_key(key);
        }
        Ok(CachedEmbedder::new(
            Arc::new(client),
            settings.cache_capacity,
            settings.cache_ttl_secs,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults() {
        let config = LabConfig::default();
        assert_eq!(config.default_model, "qwen-local");
        assert_eq!(config.sessions_dir(), PathBuf::from("data/sessions"));
        assert_eq!(config.memory_file(), PathBuf::from("data/chat_memory.json"));
        assert_eq!(config.routing.pass_threshold, 0.8);
        assert_eq!(config.embedding.model, "nomic-embed-text");
    }

    #[test]
    fn toml_with_models() {
        let config = LabConfig::parse(
            r#"
            data_dir = "/var/lib/ailab"

            [routing]
            review_threshold = 0.5

            [[models]]
            id = "gpt-4o"
            name = "GPT-4o"
            provider = "openai-compatible"
            modelId = "gpt-4o"
            baseURL = "https://api.openai.com/v1"
            apiKeyEnv = "OPENAI_API_KEY"
            "#,
            false,
        )
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/var/lib/ailab"));
        assert_eq!(config.routing.review_threshold, 0.5);
        assert_eq!(config.routing.pass_threshold, 0.8);
        assert_eq!(config.models[0].model_id, "gpt-4o");
        assert_eq!(config.models[0].api_key_env.as_deref(), Some("OPENAI_API_KEY"));
    }

    #[test]
    fn json_is_accepted() {
        let config =
            LabConfig::parse(r#"{"default_model": "deepseek-chat", "embedding": {"model": "bge-m3"}}"#, true)
                .unwrap();
        assert_eq!(config.default_model, "deepseek-chat");
        assert_eq!(config.embedding.model, "bge-m3");
        assert_eq!(config.embedding.cache_capacity, 10_000);
    }

    #[test]
    fn bad_toml_is_config_error() {
        match LabConfig::parse("data_dir = [", false) {
            Err(AgentError::ConfigError { reason }) => assert!(reason.starts_with("failed to parse TOML")),
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }

    #[test]
    fn env_overrides_file() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_DATA_DIR, "/tmp/lab"),
            (ENV_DEFAULT_MODEL, "deepseek-chat"),
            (ENV_EMBEDDING_MODEL, ""),
            (ENV_OLLAMA_BASE_URL, "http://gpu-box:11434/v1"),
        ]);
        let mut config = LabConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.data_dir, PathBuf::from("/tmp/lab"));
        assert_eq!(config.default_model, "deepseek-chat");
        assert_eq!(config.embedding.model, "nomic-embed-text");
        assert_eq!(config.ollama_base_url.as_deref(), Some("http://gpu-box:11434/v1"));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = LabConfig::load(Some(&tmp.path().join("absent.toml"))).unwrap();
        assert_eq!(config.models.len(), 0);
    }

    #[tokio::test]
    async fn registry_includes_configured_models() {
        let mut config = LabConfig::default();
        config.models.push(
            ModelEntry::new("gpt-4o", "GPT-4o", "openai-compatible", "gpt-4o")
                .with_base_url("https://api.openai.com/v1"),
        );
        let registry = config.build_registry().await.unwrap();
        let ids: Vec<String> = registry.models().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["qwen-local", "ollama-llama3", "deepseek-chat", "gpt-4o"]);
    }
}
