//! LLM integration layer.
//!
//! - [`types`] -- messages, tool calls, completions, stream events.
//! - [`model`] -- the [`LanguageModel`] trait and generation helpers.
//! - [`client`] -- HTTP client for Anthropic, OpenAI(-compatible) and Azure.
//! - [`streaming`] -- line buffering and the Anthropic SSE parser.
//! - [`streaming_openai`] -- the OpenAI SSE accumulator.
//! - [`embedding`] -- embedding models and their cache.

pub mod client;
pub mod embedding;
pub mod model;
pub mod streaming;
pub mod streaming_openai;
pub mod types;

pub use client::{LlmClient, LlmClientConfig, LlmProvider};
pub use embedding::{CachedEmbedder, EmbeddingClient, EmbeddingModel};
pub use model::{LanguageModel, SharedModel, generate_text, generate_text_from};
pub use types::{
    ChatRequest, Completion, LlmResponse, Message, Role, StreamDelta, StreamEvent, ToolCall,
    ToolDefinition, ToolResult, Usage,
};
