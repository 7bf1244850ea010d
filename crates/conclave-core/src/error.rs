//! Error taxonomy for the orchestration runtime.
//!
//! Kinds, not type hierarchies: every fallible operation in the engine
//! surfaces one of these variants so callers can apply a uniform retry /
//! escalation / termination policy without inspecting library-specific
//! error types.

use crate::ids::{RequestId, StageId, WorkflowId};
use thiserror::Error;

/// Errors produced by the orchestration runtime.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Rejected at the API boundary; no side effects occurred.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A transient failure (LLM timeout, endpoint 5xx, tool timeout, I/O
    /// `EAGAIN`). Retriable per the stage's retry policy.
    #[error("transient error in stage {stage}: {reason}")]
    Transient {
        /// Stage that observed the failure.
        stage: StageId,
        /// Human-readable reason.
        reason: String,
    },

    /// A handler-signaled or engine-detected permanent failure. Not
    /// retried; may escalate to a HITL review checkpoint if allowed.
    #[error("permanent failure in stage {stage}: {reason}")]
    Permanent {
        /// Stage that failed permanently.
        stage: StageId,
        /// Human-readable reason.
        reason: String,
    },

    /// A resource bound was exceeded (shared-context cap, memory cap,
    /// queue backpressure). The workflow fails and releases its resources.
    #[error("resource exhausted for workflow {workflow}: {reason}")]
    ResourceExhausted {
        /// Workflow that hit the bound.
        workflow: WorkflowId,
        /// Which bound and by how much.
        reason: String,
    },

    /// The workflow's wall-clock deadline elapsed.
    #[error("deadline exceeded for workflow {0}")]
    DeadlineExceeded(WorkflowId),

    /// Path traversal, non-UTF-8 where UTF-8 was required, or a checksum
    /// mismatch on resume. Fatal for the workflow; the session is preserved.
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// The workflow was cancelled. Never surfaced as an error to the
    /// caller — carried only so internal plumbing can short-circuit.
    #[error("workflow {0} cancelled")]
    Cancelled(WorkflowId),

    /// A tool call exceeded its per-call timeout.
    #[error("tool '{tool}' timed out after {elapsed_ms}ms")]
    ToolTimeout {
        /// Tool name.
        tool: String,
        /// Elapsed time before the timeout fired.
        elapsed_ms: u64,
    },

    /// A tool is unavailable under the current network mode.
    #[error("tool '{tool}' unavailable in {mode} mode")]
    ToolUnavailableInMode {
        /// Tool name.
        tool: String,
        /// Active network mode (`online` or `offline`).
        mode: String,
    },

    /// A HITL request could not be resolved because it was no longer pending.
    #[error("HITL request {0} is not pending")]
    HitlNotPending(RequestId),

    /// The shared-context store rejected a write because a size cap was hit.
    #[error("shared context full for workflow {0}")]
    ContextFull(WorkflowId),

    /// An artifact's path escaped the workspace boundary.
    #[error("path traversal rejected: {0}")]
    PathEscape(String),

    /// Serialization/deserialization failure at a persistence boundary.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(String),
}

impl EngineError {
    /// Whether this error kind is retriable by the engine's own retry policy.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::ToolTimeout { .. })
    }

    /// Whether this error should terminate the workflow outright (as opposed
    /// to being absorbed and retried, or escalated to HITL).
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ResourceExhausted { .. }
            | Self::DeadlineExceeded(_)
            | Self::Integrity(_)
            | Self::PathEscape(_)
        )
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serde(e.to_string())
    }
}

/// Result alias used throughout the runtime.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_kinds_are_retriable() {
        let err = EngineError::Transient {
            stage: StageId::from("coder-0"),
            reason: "llm timeout".into(),
        };
        assert!(err.is_transient());
        assert!(!err.is_fatal());
    }

    #[test]
    fn resource_exhausted_is_fatal_not_transient() {
        let err = EngineError::ResourceExhausted {
            workflow: WorkflowId::new(),
            reason: "context cap".into(),
        };
        assert!(err.is_fatal());
        assert!(!err.is_transient());
    }
}

