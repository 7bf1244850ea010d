//! Handler-local error type, folded into the engine's error taxonomy by the
//! caller (a handler never sees an [`conclave_core::EngineError`] directly).

use thiserror::Error;

/// Failure surfaced by an [`crate::AgentHandler`] during stage execution.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The LLM adapter failed or every endpoint was cooling down.
    #[error("llm call failed: {0}")]
    Llm(#[from] conclave_llm::LlmError),

    /// The handler's response could not be parsed into the shape its role
    /// requires (missing a required field, wrong JSON type).
    #[error("invalid handler output: {0}")]
    InvalidOutput(String),

    /// A tool call dispatched by the engine came back with `success = false`.
    #[error("tool '{tool}' failed: {reason}")]
    ToolFailed {
        /// Tool name.
        tool: String,
        /// Failure detail.
        reason: String,
    },

    /// The engine dropped the response channel before answering a
    /// `tool_call_request` or `hitl_request` (stage cancelled mid-wait).
    #[error("engine did not respond to a suspended request")]
    EngineDisconnected,

    /// The handler was cancelled cooperatively.
    #[error("handler cancelled")]
    Cancelled,
}

impl HandlerError {
    /// Whether the engine should retry the stage against its retry budget
    /// rather than failing it permanently.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Llm(e) => e.is_transient(),
            Self::InvalidOutput(_) | Self::ToolFailed { .. } | Self::EngineDisconnected | Self::Cancelled => false,
        }
    }
}

/// Result alias used throughout this crate.
pub type HandlerResult<T> = Result<T, HandlerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_llm::LlmError;

    #[test]
    fn transient_llm_failures_propagate_as_transient() {
        let err = HandlerError::from(LlmError::AllEndpointsCoolingDown(1));
        assert!(err.is_transient());
    }

    #[test]
    fn invalid_output_is_not_retried() {
        assert!(!HandlerError::InvalidOutput("missing field".into()).is_transient());
    }
}
