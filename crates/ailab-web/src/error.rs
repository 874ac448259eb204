//! Mapping of domain errors onto HTTP responses.
//!
//! Every error body is `{"error": "<message>"}`.

use ailab_agent::AgentError;
use ailab_store::StoreError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Map a store error, using `not_found` as the 404 message.
    pub fn from_store(err: StoreError, not_found: &str) -> Self {
        match err {
            StoreError::NotFound { .. } => Self::NotFound(not_found.to_string()),
            StoreError::InvalidArgument(msg) => Self::BadRequest(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let message = err.to_string();
        Self::from_store(err, &message)
    }
}

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Store(inner) => inner.into(),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_statuses() {
        let nf = ApiError::from_store(
            StoreError::NotFound {
                entity: "agent",
                id: "x".into(),
            },
            "Agent not found",
        );
        assert_eq!(nf.status(), StatusCode::NOT_FOUND);
        assert_eq!(nf.to_string(), "Agent not found");

        let bad: ApiError = StoreError::InvalidArgument("Name and Prompt are required".into()).into();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
        assert_eq!(bad.to_string(), "Name and Prompt are required");
    }

    #[test]
    fn agent_errors_unwrap_store_errors() {
        let err: ApiError = AgentError::Store(StoreError::InvalidArgument("bad id".into())).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err: ApiError = AgentError::ModelNotFound { id: "gpt-9".into() }.into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
