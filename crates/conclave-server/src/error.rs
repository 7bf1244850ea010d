//! Maps [`EngineError`] onto HTTP status codes, following a simple propagation rule:
//! user-visible messages never leak tool or model stack traces, and debug
//! details go to `tracing` rather than the response body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use conclave_core::EngineError;
use serde_json::json;
use tracing::warn;

/// An error surfaced to an HTTP caller: a status code plus a short,
/// user-safe message.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    /// Construct a `400 Bad Request`.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: message.into() }
    }

    /// Construct a `404 Not Found`.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self { status: StatusCode::NOT_FOUND, message: message.into() }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::InvalidInput(_)
            | EngineError::PathEscape(_)
            | EngineError::ToolUnavailableInMode { .. } => StatusCode::BAD_REQUEST,
            EngineError::HitlNotPending(_) => StatusCode::CONFLICT,
            EngineError::Cancelled(_) => StatusCode::NO_CONTENT,
            EngineError::ResourceExhausted { .. } | EngineError::ContextFull(_) => {
                StatusCode::TOO_MANY_REQUESTS
            }
            EngineError::DeadlineExceeded(_) | EngineError::ToolTimeout { .. } => {
                StatusCode::GATEWAY_TIMEOUT
            }
            EngineError::Transient { .. }
            | EngineError::Permanent { .. }
            | EngineError::Integrity(_)
            | EngineError::Serde(_)
            | EngineError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            warn!(error = %err, "engine error surfaced to API boundary");
        }
        Self { status, message: user_safe_message(&err) }
    }
}

/// Strip internal detail from errors whose full text could leak stack-trace
/// style information; everything else's `Display` is already a short,
/// structured phrase safe to return as-is.
fn user_safe_message(err: &EngineError) -> String {
    match err {
        EngineError::Integrity(_) => "an integrity check failed; see server logs".to_owned(),
        EngineError::Io(_) | EngineError::Serde(_) => {
            "an internal error occurred; see server logs".to_owned()
        }
        other => other.to_string(),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

