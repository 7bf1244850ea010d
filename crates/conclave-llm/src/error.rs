//! LLM adapter error taxonomy.

use thiserror::Error;

/// Errors surfaced by a chat provider or the endpoint pool wrapping it.
#[derive(Debug, Error)]
pub enum LlmError {
    /// No endpoint in the pool has a usable API key and none is local.
    #[error("API key not configured for endpoint {endpoint}")]
    ApiKeyNotConfigured {
        /// Endpoint URL missing credentials.
        endpoint: String,
    },

    /// The outbound request itself failed (connect, TLS, DNS).
    #[error("request to {endpoint} failed: {reason}")]
    RequestFailed {
        /// Endpoint that was being called.
        endpoint: String,
        /// Underlying failure description.
        reason: String,
    },

    /// The endpoint responded with a non-2xx status.
    #[error("endpoint {endpoint} returned HTTP {status}: {body}")]
    ApiStatus {
        /// Endpoint that was being called.
        endpoint: String,
        /// HTTP status code.
        status: u16,
        /// Response body, truncated upstream if large.
        body: String,
    },

    /// The endpoint signalled a rate limit.
    #[error("rate limit exceeded, retry after {retry_after_secs:?}s")]
    RateLimitExceeded {
        /// Seconds to wait before retrying, if the endpoint provided one.
        retry_after_secs: Option<u64>,
    },

    /// A streamed or non-streamed response could not be parsed.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The conversation exceeds the model's context window.
    #[error("context length exceeded: {current} tokens against a {max} token limit")]
    ContextLengthExceeded {
        /// Estimated tokens in the request.
        current: usize,
        /// Model's maximum context length.
        max: usize,
    },

    /// A mid-stream decoding failure.
    #[error("streaming error: {0}")]
    StreamingError(String),

    /// Every configured endpoint is in its failure cooldown window.
    #[error("all {0} configured endpoints are cooling down after recent failures")]
    AllEndpointsCoolingDown(usize),

    /// The caller's cancellation token fired mid-stream.
    #[error("chat stream cancelled")]
    Cancelled,

    /// The request's deadline elapsed before the stream completed.
    #[error("chat stream deadline exceeded")]
    DeadlineExceeded,
}

impl LlmError {
    /// Whether the engine should retry the stage that hit this error
    /// against its retry budget, rather than failing it permanently.
    ///
    /// `Cancelled`/`DeadlineExceeded` are deliberately excluded: both are
    /// already terminal outcomes the caller decided on (workflow
    /// cancellation, stage timeout), not failures to retry around.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RequestFailed { .. }
                | Self::ApiStatus { .. }
                | Self::RateLimitExceeded { .. }
                | Self::StreamingError(_)
                | Self::AllEndpointsCoolingDown(_)
        )
    }
}

/// Result alias for the LLM adapter.
pub type LlmResult<T> = Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_failures_are_transient() {
        assert!(LlmError::RequestFailed { endpoint: "x".into(), reason: "timeout".into() }.is_transient());
        assert!(LlmError::AllEndpointsCoolingDown(2).is_transient());
    }

    #[test]
    fn malformed_output_and_lifecycle_signals_are_not_transient() {
        assert!(!LlmError::InvalidResponse("bad json".into()).is_transient());
        assert!(!LlmError::ContextLengthExceeded { current: 1, max: 1 }.is_transient());
        assert!(!LlmError::Cancelled.is_transient());
        assert!(!LlmError::DeadlineExceeded.is_transient());
    }
}
