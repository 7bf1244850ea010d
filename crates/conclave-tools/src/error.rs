//! Tool execution error taxonomy.

/// Errors a tool or the executor can surface.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Parameter validation failed. Never retried by the caller.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// The tool ran but the underlying operation failed.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// A referenced path does not exist.
    #[error("path not found: {0}")]
    PathNotFound(String),

    /// The tool's deadline elapsed before it completed.
    #[error("timeout after {0}ms")]
    Timeout(u64),

    /// The tool is not callable under the current network mode.
    #[error("tool unavailable in {0} mode")]
    UnavailableInMode(String),

    /// No tool is registered under the requested name.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// A missing binary, permission failure, or other system-level error,
    /// surfaced unchanged.
    #[error("system error: {0}")]
    System(String),

    /// The caller's cancellation token fired mid-execution.
    #[error("cancelled")]
    Cancelled,
}

impl From<std::io::Error> for ToolError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Self::PathNotFound(e.to_string()),
            _ => Self::System(e.to_string()),
        }
    }
}

/// Result type every tool's `execute` returns.
pub type ToolOutcome = Result<String, ToolError>;

