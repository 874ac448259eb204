//! Shared helper functions used across CLI subcommands.
//!
//! Includes tracing initialization, wiring of the registry, stores and
//! embedder from configuration, and terminal input.

use std::io::{self, BufRead, Write as _};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ailab_agent::testing::{EchoStrategy, KeywordEmbedder};
use ailab_agent::{ChatService, EmbeddingModel, LabConfig, ProviderRegistry, SharedModel};
use ailab_store::{AgentProfileStore, SessionStore};

use crate::cli::Cli;

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
///
/// `RUST_LOG` overrides the default.  Logs go to stderr so command output
/// on stdout stays clean.
pub fn init_tracing(default_level: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

// ---------------------------------------------------------------------------
// Lab
// ---------------------------------------------------------------------------

/// Provider names the built-in registry knows.
const BUILTIN_PROVIDERS: [&str; 5] = ["ollama", "openai-compatible", "anthropic", "azure", "google"];

/// Everything a subcommand needs, built once from configuration.
pub struct Lab {
    pub config: LabConfig,
    pub offline: bool,
    registry: Arc<ProviderRegistry>,
}

impl Lab {
    pub async fn load(cli: &Cli) -> Result<Self> {
        let config = LabConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
        let registry = config
            .build_registry()
            .await
            .context("failed to build the model registry")?;

        if cli.offline {
            for provider in BUILTIN_PROVIDERS {
                registry.register_provider(provider, Arc::new(EchoStrategy));
            }
        }

        info!(
            data_dir = %config.data_dir.display(),
            default_model = %config.default_model,
            models = registry.models().len(),
            offline = cli.offline,
            "lab ready"
        );
        Ok(Self {
            config,
            offline: cli.offline,
            registry: Arc::new(registry),
        })
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// The model for `id`, or the configured default.
    pub async fn model(&self, id: Option<&str>) -> Result<SharedModel> {
        let id = id.unwrap_or(&self.config.default_model);
        self.registry
            .get_model_instance(id)
            .await
            .with_context(|| format!("failed to create model `{id}`"))
    }

    pub fn sessions(&self) -> SessionStore {
        SessionStore::new(self.config.sessions_dir())
    }

    pub fn agents(&self) -> AgentProfileStore {
        AgentProfileStore::new(self.config.agents_dir())
    }

    pub fn chat_service(&self) -> ChatService {
        ChatService::new(
            Arc::clone(&self.registry),
            self.sessions(),
            self.agents(),
            self.config.default_model.clone(),
        )
    }

    /// The configured embedder, or a keyword embedder when offline.
    pub fn embedder(&self) -> Result<Arc<dyn EmbeddingModel>> {
        if self.offline {
            return Ok(Arc::new(offline_embedder()));
        }
        let embedder = self
            .config
            .build_embedder()
            .context("failed to create the embedding client")?;
        Ok(Arc::new(embedder))
    }
}

/// Keyword axes covering the vocabulary of the routing demos.
fn offline_embedder() -> KeywordEmbedder {
    KeywordEmbedder::new(
        "offline-keywords",
        [
            vec!["系统", "管理", "配置", "参数", "重置", "后台"],
            vec!["报错", "崩溃", "闪退", "错误", "失败", "找不到", "安装"],
            vec!["退", "钱", "款", "不满意", "服务"],
            vec!["ai", "人工智能", "机器学习", "智能", "生活"],
        ],
    )
}

// ---------------------------------------------------------------------------
// Terminal input
// ---------------------------------------------------------------------------

/// Print `prompt` and read one trimmed line.  `None` at end of input.
pub fn read_line(prompt: &str) -> Result<Option<String>> {
    print!("{prompt}");
    io::stdout().flush().context("failed to flush stdout")?;

    let mut line = String::new();
    let read = io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read input")?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

/// True for the words that end an interactive loop.
pub fn is_exit(line: &str) -> bool {
    matches!(line, "quit" | "exit")
}
