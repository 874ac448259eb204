//! LLM layer for ailab.
//!
//! Everything that talks to a model lives here: the wire types and HTTP
//! client, the provider registry that turns configuration into live model
//! handles, the wrappers that make calls more reliable, and the two loops
//! built on top (tool calling and session chat).
//!
//! ## Architecture
//!
//! ```text
//!  LabConfig ──> ProviderRegistry ──(strategy per provider)──> SharedModel
//!                                                                  │
//!        ┌──────────────┬──────────────┬───────────────────────────┤
//!        │              │              │                           │
//!  WrappedModel   FallbackModel  LoadBalancedModel            LlmClient
//!  (middleware)   (cooldown)     (round-robin)          (Anthropic / OpenAI /
//!        │              │              │                 Azure, SSE streaming)
//!        └──────────────┴──────┬───────┘
//!                              │
//!          ┌───────────────────┼──────────────────┐
//!          │                   │                  │
//!     run_agent           ChatService       generate_object
//!   (tool calling)    (sessions, titles)   (schema-checked JSON)
//! ```
//!
//! ## Modules
//!
//! - [`llm`] -- wire types, the [`LanguageModel`] trait, HTTP client, embeddings.
//! - [`registry`] -- provider strategies and the memoized model registry.
//! - [`middleware`] -- request/response hooks around any model.
//! - [`reliability`] -- retry, fallback and load balancing.
//! - [`structured`] -- JSON output validated against a schema.
//! - [`runtime`] -- the multi-step tool-calling loop.
//! - [`tools`] -- deterministic demo tools.
//! - [`orchestration`] -- supervisor, self-reflection and writer/reviewer pipelines.
//! - [`state`] -- shared execution state for tool runs.
//! - [`compaction`] -- history summarisation.
//! - [`chat`] -- session chat, titles and file memory.
//! - [`config`] -- configuration file and environment overrides.
//! - [`testing`] -- scripted models for tests and offline use.

pub mod chat;
pub mod compaction;
pub mod config;
pub mod error;
pub mod llm;
pub mod middleware;
pub mod orchestration;
pub mod registry;
pub mod reliability;
pub mod runtime;
pub mod state;
pub mod structured;
pub mod testing;
pub mod tools;

pub use chat::{ChatOutcome, ChatService, ChatTurn, MemoryChat, generate_title};
pub use compaction::{CompactionConfig, compact_messages, needs_compaction, summarize_history};
pub use config::LabConfig;
pub use error::{AgentError, Result};
pub use llm::{
    CachedEmbedder, ChatRequest, Completion, EmbeddingClient, EmbeddingModel, LanguageModel,
    LlmClient, LlmClientConfig, LlmProvider, LlmResponse, Message, Role, SharedModel, ToolCall,
    ToolDefinition, ToolResult, Usage, generate_text, generate_text_from,
};
pub use middleware::{
    LoggingMiddleware, Middleware, SystemPromptMiddleware, UsageTracker, WrappedModel, wrap_model,
};
pub use orchestration::{
    Collaboration, CollaborationReport, ReflectionLoop, ReflectionReport, Supervisor,
    SupervisorReport, TaskIntent, Worker,
};
pub use registry::{ModelEntry, ProviderRegistry, ProviderStrategy};
pub use reliability::{FallbackModel, LoadBalancedModel, RetryManager};
pub use runtime::{AgentConfig, AgentContext, AgentResponse, AgentStep, ToolAdapter, run_agent};
pub use state::{ExecutionState, StateSummary};
pub use structured::{generate_object, generate_value};
pub use tools::DemoToolkit;
