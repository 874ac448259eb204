//! Agent error types.
//!
//! Every subsystem of the crate surfaces failures through [`AgentError`].
//! The registry messages are user facing (the web API returns them as-is),
//! so their wording is kept stable.

use uuid::Uuid;

/// Unified error type for the LLM layer.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    // -- LLM errors ----------------------------------------------------------
    /// An HTTP request to the LLM provider failed.
    #[error("llm request failed: {reason}")]
    LlmRequestFailed { reason: String },

    /// The LLM response could not be parsed into the expected format.
    #[error("llm response parse error: {reason}")]
    LlmParseFailed { reason: String },

    /// The streaming SSE connection was interrupted or produced invalid data.
    #[error("llm stream error: {reason}")]
    LlmStreamError { reason: String },

    /// The API key is missing for a provider that requires one.
    #[error("missing api key for provider: {provider}")]
    MissingApiKey { provider: String },

    /// An embedding request failed or returned an unexpected shape.
    #[error("embedding failed: {reason}")]
    EmbeddingFailed { reason: String },

    // -- Registry errors -----------------------------------------------------
    /// A model entry is missing one of its mandatory fields.
    #[error("Missing required field: {field}")]
    MissingField { field: &'static str },

    /// A model entry names a provider with no registered strategy.
    #[error("Unsupported provider: {provider}")]
    UnsupportedProvider { provider: String },

    /// The requested model id is not registered.
    #[error("Model {id} not found in registry")]
    ModelNotFound { id: String },

    /// The strategy for a registered model has since disappeared.
    #[error("Provider strategy {provider} not found")]
    ProviderNotFound { provider: String },

    /// A strategy failed to build a client for a model entry.
    #[error("Failed to initialize {id} ({provider}): {reason}")]
    ModelInitFailed {
        id: String,
        provider: String,
        reason: String,
    },

    // -- Reliability ---------------------------------------------------------
    /// Every attempt of a retried operation failed.
    #[error("{operation}: all {attempts} attempts failed: {last_error}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last_error: Box<AgentError>,
    },

    /// A fallback chain or load-balanced pool was built without models.
    #[error("no models available: {reason}")]
    NoModelsAvailable { reason: String },

    // -- Structured output ---------------------------------------------------
    /// The model reply did not contain a JSON object.
    #[error("no JSON object found in model output")]
    NoJsonFound,

    /// The model reply did not satisfy the requested schema.
    #[error("structured output failed schema validation: {}", .errors.join("; "))]
    SchemaValidation { errors: Vec<String> },

    /// The schema itself could not be compiled.
    #[error("invalid JSON schema: {reason}")]
    InvalidSchema { reason: String },

    // -- Runtime errors ------------------------------------------------------
    /// The tool-calling loop used up its step budget.
    #[error("agent exceeded max steps ({max_steps}) for task {task_id}")]
    MaxStepsExceeded { task_id: Uuid, max_steps: u32 },

    /// A tool call referenced by the LLM does not exist in any adapter.
    #[error("unknown tool: {tool_name}")]
    UnknownTool { tool_name: String },

    /// A tool invocation failed.
    #[error("tool execution failed for `{tool_name}`: {reason}")]
    ToolExecutionFailed { tool_name: String, reason: String },

    // -- Configuration errors ------------------------------------------------
    /// Configuration loading or validation failed.
    #[error("config error: {reason}")]
    ConfigError { reason: String },

    // -- Upstream ------------------------------------------------------------
    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An error propagated from the store crate.
    #[error("store error: {0}")]
    Store(#[from] ailab_store::StoreError),

    /// Catch-all for unexpected internal errors.
    #[error("internal agent error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the agent crate.
pub type Result<T> = std::result::Result<T, AgentError>;

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        Self::LlmRequestFailed {
            reason: err.to_string(),
        }
    }
}

impl AgentError {
    /// Whether the provider refused the request because of throttling or
    /// quota, as opposed to a hard failure.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::LlmRequestFailed { reason } | Self::LlmStreamError { reason } => {
                let reason = reason.to_lowercase();
                reason.contains("429")
                    || reason.contains("rate_limit")
                    || reason.contains("rate limit")
                    || reason.contains("too many requests")
                    || reason.contains("quota")
                    || reason.contains("throttl")
                    || reason.contains("overloaded")
            }
            Self::RetriesExhausted { last_error, .. } => last_error.is_rate_limited(),
            _ => false,
        }
    }
}
