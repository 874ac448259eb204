//! Provider registry.
//!
//! A strategy table maps a provider name (`ollama`, `openai-compatible`,
//! `anthropic`, `azure`, `google`) to a factory that turns a [`ModelEntry`]
//! into a live [`LanguageModel`](crate::llm::model::LanguageModel).  Model entries are registered by id and
//! instances are built lazily on first use, then memoized in a `moka` cache
//! until the entry is re-registered.  Every registration bumps the entry's
//! generation; a cached instance is only served while its generation is
//! current, so a build that races a re-registration is never reused.
//!
//! ```text
//!  register_model(entry) ──► validate ──► upsert entry, bump generation ──► invalidate id
//!
//!  get_model_instance(id)
//!     ├─► find entry + generation
//!     │ cache hit, same generation ─────────────────────► Arc<dyn LanguageModel>
//!     │ miss or stale
//!     ├─► find strategy ──► strategy.create(entry)
//!     └─► cache.insert(id) if still current ────────────► Arc<dyn LanguageModel>
//! ```

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use dashmap::DashMap;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{AgentError, Result};
use crate::llm::client::{GOOGLE_OPENAI_BASE_URL, LlmClient, LlmClientConfig};
use crate::llm::model::SharedModel;

// ---------------------------------------------------------------------------
// Model entries
// ---------------------------------------------------------------------------

/// Configuration of one selectable model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Registry key, e.g. `qwen-local`.
    #[serde(default)]
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Strategy name.
    #[serde(default)]
    pub provider: String,
    /// Provider-side model name.
    #[serde(default, rename = "modelId", alias = "model_id")]
    pub model_id: String,
    #[serde(
        default,
        rename = "baseURL",
        alias = "base_url",
        skip_serializing_if = "Option::is_none"
    )]
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key.
    #[serde(
        default,
        rename = "apiKeyEnv",
        alias = "api_key_env",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_key_env: Option<String>,
    /// UI grouping, `local` or `cloud`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(
        default,
        rename = "resourceName",
        alias = "resource_name",
        skip_serializing_if = "Option::is_none"
    )]
    pub resource_name: Option<String>,
    #[serde(
        default,
        rename = "deploymentName",
        alias = "deployment_name",
        skip_serializing_if = "Option::is_none"
    )]
    pub deployment_name: Option<String>,
}

impl ModelEntry {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        provider: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            provider: provider.into(),
            model_id: model_id.into(),
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_api_key_env(mut self, var: impl Into<String>) -> Self {
        self.api_key_env = Some(var.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Overlay `update` on `self`.  Non-empty fields of `update` win; absent
    /// optional fields keep their current value.
    fn merge(self, update: ModelEntry) -> ModelEntry {
        fn pick(new: String, old: String) -> String {
            if new.is_empty() { old } else { new }
        }
        ModelEntry {
            id: pick(update.id, self.id),
            name: pick(update.name, self.name),
            provider: pick(update.provider, self.provider),
            model_id: pick(update.model_id, self.model_id),
            base_url: update.base_url.or(self.base_url),
            api_key_env: update.api_key_env.or(self.api_key_env),
            group: update.group.or(self.group),
            resource_name: update.resource_name.or(self.resource_name),
            deployment_name: update.deployment_name.or(self.deployment_name),
        }
    }
}

/// The models every registry starts with.
pub fn default_models() -> Vec<ModelEntry> {
    vec![
        ModelEntry::new(
            "qwen-local",
            "Qwen 2.5 Coder (Local)",
            "ollama",
            "qwen2.5-coder:latest",
        )
        .with_group("local"),
        ModelEntry::new(
            "ollama-llama3",
            "Llama 3.2 Vision (Local)",
            "ollama",
            "llama3.2-vision:latest",
        )
        .with_group("local"),
        ModelEntry::new(
            "deepseek-chat",
            "DeepSeek Chat",
            "openai-compatible",
            "deepseek-chat",
        )
        .with_base_url("https://api.deepseek.com")
        .with_api_key_env("DEEPSEEK_API_KEY")
        .with_group("cloud"),
    ]
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// Builds a model client from an entry.
#[async_trait]
pub trait ProviderStrategy: Send + Sync {
    async fn create(&self, entry: &ModelEntry) -> Result<SharedModel>;
}

/// Read a non-empty environment variable.
fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Key from the entry's `api_key_env`, else from `fallback_var`.
fn resolve_key(entry: &ModelEntry, fallback_var: Option<&str>) -> String {
    entry
        .api_key_env
        .as_deref()
        .and_then(env_non_empty)
        .or_else(|| fallback_var.and_then(env_non_empty))
        .unwrap_or_default()
}

fn client(config: LlmClientConfig) -> Result<SharedModel> {
    Ok(Arc::new(LlmClient::new(config)?))
}

/// Local Ollama through its OpenAI-compatible `/v1` endpoint.
pub struct OllamaStrategy {
    default_base_url: Option<String>,
}

impl OllamaStrategy {
    pub fn new(default_base_url: Option<String>) -> Self {
        Self { default_base_url }
    }
}

#[async_trait]
impl ProviderStrategy for OllamaStrategy {
    async fn create(&self, entry: &ModelEntry) -> Result<SharedModel> {
        let base = entry
            .base_url
            .as_deref()
            .or(self.default_base_url.as_deref());
        client(LlmClientConfig::ollama(&entry.model_id, base))
    }
}

/// Any OpenAI-compatible cloud endpoint.  `base_url` is required.
pub struct OpenAiCompatibleStrategy;

#[async_trait]
impl ProviderStrategy for OpenAiCompatibleStrategy {
    async fn create(&self, entry: &ModelEntry) -> Result<SharedModel> {
        let base_url = entry
            .base_url
            .as_deref()
            .ok_or_else(|| AgentError::ConfigError {
                reason: "baseURL is required for openai-compatible models".into(),
            })?;
        client(LlmClientConfig::openai_compatible(
            resolve_key(entry, None),
            &entry.model_id,
            base_url,
        ))
    }
}

/// Anthropic Messages API.  Key from `api_key_env` or `ANTHROPIC_API_KEY`.
pub struct AnthropicStrategy;

#[async_trait]
impl ProviderStrategy for AnthropicStrategy {
    async fn create(&self, entry: &ModelEntry) -> Result<SharedModel> {
        let mut config = LlmClientConfig::anthropic(
            resolve_key(entry, Some("ANTHROPIC_API_KEY")),
            &entry.model_id,
        );
        if let Some(base) = &entry.base_url {
            config.base_url = base.trim_end_matches('/').to_owned();
        }
        client(config)
    }
}

/// Azure OpenAI.  Resource from the entry or `AZURE_RESOURCE_NAME`,
/// deployment from the entry or the model id, key from `api_key_env` or
/// `AZURE_API_KEY`.
pub struct AzureStrategy;

#[async_trait]
impl ProviderStrategy for AzureStrategy {
    async fn create(&self, entry: &ModelEntry) -> Result<SharedModel> {
        let resource = entry
            .resource_name
            .clone()
            .or_else(|| env_non_empty("AZURE_RESOURCE_NAME"))
            .ok_or_else(|| AgentError::ConfigError {
                reason: "no Azure resource name (set resourceName or AZURE_RESOURCE_NAME)".into(),
            })?;
        let deployment = entry.deployment_name.as_deref().unwrap_or(&entry.model_id);
        client(LlmClientConfig::azure(
            &resource,
            deployment,
            resolve_key(entry, Some("AZURE_API_KEY")),
            None,
        ))
    }
}

/// Gemini through Google's OpenAI-compatible endpoint.
pub struct GoogleStrategy;

#[async_trait]
impl ProviderStrategy for GoogleStrategy {
    async fn create(&self, entry: &ModelEntry) -> Result<SharedModel> {
        client(LlmClientConfig::openai_compatible(
            resolve_key(entry, Some("GOOGLE_GENERATIVE_AI_API_KEY")),
            &entry.model_id,
            entry.base_url.as_deref().unwrap_or(GOOGLE_OPENAI_BASE_URL),
        ))
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Strategy table, model list and instance cache.
pub struct ProviderRegistry {
    strategies: DashMap<String, Arc<dyn ProviderStrategy>>,
    models: RwLock<Vec<ModelEntry>>,
    /// Registration count per id.  Written under the `models` write lock.
    generations: DashMap<String, u64>,
    /// Instances tagged with the generation they were built from.
    instances: Cache<String, (u64, SharedModel)>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    /// An empty registry: no strategies, no models.
    #[must_use]
    pub fn new() -> Self {
        Self {
            strategies: DashMap::new(),
            models: RwLock::new(Vec::new()),
            generations: DashMap::new(),
            instances: Cache::builder().max_capacity(256).build(),
        }
    }

    /// Built-in strategies and default models.  Ollama uses
    /// `ollama_base_url` when given.
    #[must_use]
    pub fn with_defaults(ollama_base_url: Option<String>) -> Self {
        let registry = Self::new();
        registry.register_provider("ollama", Arc::new(OllamaStrategy::new(ollama_base_url)));
        registry.register_provider("openai-compatible", Arc::new(OpenAiCompatibleStrategy));
        registry.register_provider("anthropic", Arc::new(AnthropicStrategy));
        registry.register_provider("azure", Arc::new(AzureStrategy));
        registry.register_provider("google", Arc::new(GoogleStrategy));

        if let Ok(mut models) = registry.models.write() {
            *models = default_models();
        }
        registry
    }

    /// Add or replace a provider strategy.
    pub fn register_provider(&self, name: impl Into<String>, strategy: Arc<dyn ProviderStrategy>) {
        let name = name.into();
        debug!(provider = %name, "provider strategy registered");
        self.strategies.insert(name, strategy);
    }

    pub fn has_provider(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }

    /// Check mandatory fields and that the provider is known.
    pub fn validate(&self, entry: &ModelEntry) -> Result<()> {
        let required = [
            ("id", &entry.id),
            ("name", &entry.name),
            ("provider", &entry.provider),
            ("modelId", &entry.model_id),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(AgentError::MissingField { field });
            }
        }
        if !self.has_provider(&entry.provider) {
            return Err(AgentError::UnsupportedProvider {
                provider: entry.provider.clone(),
            });
        }
        Ok(())
    }

    /// Insert or update a model.  Updates merge into the existing entry in
    /// place; the cached instance for the id is dropped either way.
    pub async fn register_model(&self, entry: ModelEntry) -> Result<()> {
        self.validate(&entry)?;
        let id = entry.id.clone();
        {
            let mut models = self.models.write().map_err(|_| {
                AgentError::Internal("model registry lock poisoned".into())
            })?;
            match models.iter_mut().find(|m| m.id == entry.id) {
                Some(existing) => {
                    *existing = std::mem::take(existing).merge(entry);
                    info!(model_id = %id, "model entry updated");
                }
                None => {
                    info!(model_id = %id, provider = %entry.provider, "model entry registered");
                    models.push(entry);
                }
            }
            *self.generations.entry(id.clone()).or_insert(0) += 1;
        }
        self.instances.invalidate(&id).await;
        Ok(())
    }

    /// Snapshot of the registered models, in registration order.
    pub fn models(&self) -> Vec<ModelEntry> {
        self.models.read().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn model(&self, id: &str) -> Option<ModelEntry> {
        self.models
            .read()
            .ok()
            .and_then(|m| m.iter().find(|e| e.id == id).cloned())
    }

    fn generation(&self, id: &str) -> u64 {
        self.generations.get(id).map_or(0, |g| *g.value())
    }

    /// Entry and generation read under one lock.
    fn current(&self, id: &str) -> Option<(ModelEntry, u64)> {
        let models = self.models.read().ok()?;
        let entry = models.iter().find(|e| e.id == id)?.clone();
        Some((entry, self.generation(id)))
    }

    /// The live model for `id`, built on first use.  Failed builds are not
    /// cached.
    pub async fn get_model_instance(&self, id: &str) -> Result<SharedModel> {
        let (entry, generation) = self
            .current(id)
            .ok_or_else(|| AgentError::ModelNotFound { id: id.to_owned() })?;

        if let Some((built_for, instance)) = self.instances.get(id).await
            && built_for == generation
        {
            return Ok(instance);
        }

        let strategy = self
            .strategies
            .get(&entry.provider)
            .map(|s| Arc::clone(s.value()))
            .ok_or_else(|| AgentError::ProviderNotFound {
                provider: entry.provider.clone(),
            })?;

        let instance = strategy.create(&entry).await.map_err(|e| {
            warn!(model_id = %id, provider = %entry.provider, error = %e, "model initialization failed");
            AgentError::ModelInitFailed {
                id: id.to_owned(),
                provider: entry.provider.clone(),
                reason: e.to_string(),
            }
        })?;

        debug!(model_id = %id, provider = %entry.provider, "model instance created");
        if self.generation(id) == generation {
            self.instances
                .insert(id.to_owned(), (generation, Arc::clone(&instance)))
                .await;
        } else {
            debug!(model_id = %id, "entry re-registered during build, instance not cached");
        }
        Ok(instance)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::Notify;

    use super::*;
    use crate::llm::model::LanguageModel;
    use crate::testing::ScriptedModel;

    /// Counts builds; fails for model ids starting with `broken`.
    struct CountingStrategy {
        builds: AtomicUsize,
    }

    #[async_trait]
    impl ProviderStrategy for CountingStrategy {
        async fn create(&self, entry: &ModelEntry) -> Result<SharedModel> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            if entry.model_id.starts_with("broken") {
                return Err(AgentError::MissingApiKey {
                    provider: "mock".into(),
                });
            }
            Ok(Arc::new(ScriptedModel::new(entry.model_id.clone())))
        }
    }

    fn registry() -> (ProviderRegistry, Arc<CountingStrategy>) {
        let registry = ProviderRegistry::with_defaults(None);
        let strategy = Arc::new(CountingStrategy {
            builds: AtomicUsize::new(0),
        });
        registry.register_provider("mock", strategy.clone());
        (registry, strategy)
    }

    #[test]
    fn defaults_are_in_order() {
        let (registry, _) = registry();
        let ids: Vec<String> = registry.models().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["qwen-local", "ollama-llama3", "deepseek-chat"]);
        let deepseek = registry.model("deepseek-chat").unwrap();
        assert_eq!(deepseek.api_key_env.as_deref(), Some("DEEPSEEK_API_KEY"));
        assert_eq!(deepseek.group.as_deref(), Some("cloud"));
    }

    #[test]
    fn validation_messages() {
        let (registry, _) = registry();
        let mut entry = ModelEntry::new("x", "X", "mock", "");
        assert_eq!(
            registry.validate(&entry).unwrap_err().to_string(),
            "Missing required field: modelId"
        );
        entry.model_id = "m".into();
        entry.provider = "nope".into();
        assert_eq!(
            registry.validate(&entry).unwrap_err().to_string(),
            "Unsupported provider: nope"
        );
        entry.name = String::new();
        assert_eq!(
            registry.validate(&entry).unwrap_err().to_string(),
            "Missing required field: name"
        );
    }

    #[tokio::test]
    async fn instances_are_memoized_until_reregistered() {
        let (registry, strategy) = registry();
        registry
            .register_model(ModelEntry::new("m1", "Mock", "mock", "v1"))
            .await
            .unwrap();

        let a = registry.get_model_instance("m1").await.unwrap();
        let b = registry.get_model_instance("m1").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(strategy.builds.load(Ordering::SeqCst), 1);

        registry
            .register_model(ModelEntry::new("m1", "Mock", "mock", "v2"))
            .await
            .unwrap();
        let c = registry.get_model_instance("m1").await.unwrap();
        assert_eq!(c.model_id(), "v2");
        assert_eq!(strategy.builds.load(Ordering::SeqCst), 2);
    }

    /// Signals `started`, then waits on `gate` before building.
    struct GatedStrategy {
        started: Arc<Notify>,
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl ProviderStrategy for GatedStrategy {
        async fn create(&self, entry: &ModelEntry) -> Result<SharedModel> {
            self.started.notify_one();
            self.gate.notified().await;
            Ok(Arc::new(ScriptedModel::new(entry.model_id.clone())))
        }
    }

    #[tokio::test]
    async fn reregistration_during_build_is_not_cached() {
        let started = Arc::new(Notify::new());
        let gate = Arc::new(Notify::new());
        let registry = Arc::new(ProviderRegistry::new());
        registry.register_provider(
            "gated",
            Arc::new(GatedStrategy {
                started: Arc::clone(&started),
                gate: Arc::clone(&gate),
            }),
        );
        registry
            .register_model(ModelEntry::new("m", "Gated", "gated", "v1"))
            .await
            .unwrap();

        let building = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.get_model_instance("m").await })
        };
        started.notified().await;
        registry
            .register_model(ModelEntry::new("m", "Gated", "gated", "v2"))
            .await
            .unwrap();
        gate.notify_one();

        let first = building.await.unwrap().unwrap();
        assert_eq!(first.model_id(), "v1");

        gate.notify_one();
        let current = registry.get_model_instance("m").await.unwrap();
        assert_eq!(current.model_id(), "v2");
    }

    #[tokio::test]
    async fn update_merges_and_keeps_position() {
        let (registry, _) = registry();
        let update = ModelEntry {
            id: "deepseek-chat".into(),
            name: "DeepSeek V3".into(),
            provider: "openai-compatible".into(),
            model_id: "deepseek-chat".into(),
            ..ModelEntry::default()
        };
        registry.register_model(update).await.unwrap();

        let models = registry.models();
        assert_eq!(models.len(), 3);
        assert_eq!(models[2].name, "DeepSeek V3");
        assert_eq!(models[2].base_url.as_deref(), Some("https://api.deepseek.com"));
    }

    #[tokio::test]
    async fn lookup_errors() {
        let (registry, strategy) = registry();
        match registry.get_model_instance("ghost").await {
            Err(e) => assert_eq!(e.to_string(), "Model ghost not found in registry"),
            Ok(_) => panic!("expected ModelNotFound"),
        }

        registry
            .register_model(ModelEntry::new("bad", "Bad", "mock", "broken-1"))
            .await
            .unwrap();
        for _ in 0..2 {
            match registry.get_model_instance("bad").await {
                Err(AgentError::ModelInitFailed { id, provider, reason }) => {
                    assert_eq!(id, "bad");
                    assert_eq!(provider, "mock");
                    assert!(reason.contains("missing api key"));
                }
                Err(other) => panic!("expected ModelInitFailed, got {other:?}"),
                Ok(_) => panic!("expected ModelInitFailed"),
            }
        }
        // Failures are retried, not cached.
        assert_eq!(strategy.builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn ollama_entries_build_without_keys() {
        let registry = ProviderRegistry::with_defaults(Some("http://127.0.0.1:11434/v1".into()));
        let model = registry.get_model_instance("qwen-local").await.unwrap();
        assert_eq!(model.model_id(), "qwen2.5-coder:latest");
    }

    #[test]
    fn entry_json_uses_camel_case() {
        let entry: ModelEntry = serde_json::from_str(
            r#"{"id":"g","name":"Gemini","provider":"google","modelId":"gemini-2.0-flash","apiKeyEnv":"GEMINI_KEY"}"#,
        )
        .unwrap();
        assert_eq!(entry.model_id, "gemini-2.0-flash");
        assert_eq!(entry.api_key_env.as_deref(), Some("GEMINI_KEY"));

        let json = serde_json::to_value(default_models()[2].clone()).unwrap();
        assert_eq!(json["baseURL"], "https://api.deepseek.com");
        assert!(json.get("resourceName").is_none());
    }
}
