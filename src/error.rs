//! Service-wide error type.
//!
//! "Not found", "transient upstream failure", and "validation failure"
//! must be distinguishable by callers and tests, so each gets its own
//! variant instead of a stringly-typed message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Errors surfaced by the proxy's domain and client layers.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// A task id or repository file that does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Request rejected before any write happened (duplicate id,
    /// illegal status transition, malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// SHA precondition failed and retries were exhausted.
    #[error("write conflict: {0}")]
    Conflict(String),

    /// GitHub or model API failure (network, 5xx, bad payload).
    #[error("upstream error: {0}")]
    Upstream(String),

    /// A repository document that could not be parsed or serialized.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ProxyError {
    /// Shorthand for a not-found task id.
    pub fn task_not_found(task_id: &str) -> Self {
        ProxyError::NotFound(format!("Task {} not found", task_id))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::NotFound(_) => StatusCode::NOT_FOUND,
            ProxyError::Validation(_) => StatusCode::BAD_REQUEST,
            ProxyError::Conflict(_) => StatusCode::CONFLICT,
            ProxyError::Upstream(_) | ProxyError::Yaml(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether a retry with the same input could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProxyError::Upstream(_) | ProxyError::Conflict(_))
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(serde_json::json!({ "detail": self.to_string() }));
        (status, body).into_response()
    }
}
