//! Error types for the ailab-store crate.
//!
//! All storage operations return [`StoreError`] via [`StoreResult`].

use thiserror::Error;

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the file-backed stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading, writing or listing a file failed.
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored file exists but does not contain the expected structure.
    #[error("corrupt {entity} file {path}: {reason}")]
    Corrupt {
        entity: &'static str,
        path: String,
        reason: String,
    },

    /// The requested record was not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// An invalid argument was provided to a store operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Cache operation failed.
    #[error("cache error: {0}")]
    Cache(String),
}

impl StoreError {
    /// Build an [`StoreError::Io`] tagged with the path that failed.
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }

    /// Whether this error means the record simply does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
