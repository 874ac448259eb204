//! Routing error types.

use ailab_agent::AgentError;

#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    /// Two vectors of different length were compared or averaged.
    #[error("vector dimensions differ: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    /// An operation that needs at least one item got none.
    #[error("{what} must not be empty")]
    Empty { what: &'static str },

    /// A keyword pattern failed to compile.
    #[error("invalid pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// The keyword automaton could not be built.
    #[error("failed to build keyword matcher: {0}")]
    Automaton(String),

    /// A model decision named a route outside the allowed set.
    #[error("model chose unknown route `{route}`")]
    UnknownRoute { route: String },

    /// An embedding or model call failed.
    #[error(transparent)]
    Agent(#[from] AgentError),
}

pub type Result<T> = std::result::Result<T, RoutingError>;
