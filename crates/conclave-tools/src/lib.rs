#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Tool Registry & Executor (C1): the catalog of callable tools, parameter
//! validation, timeout-bounded invocation, and network-mode gating.

mod context;
mod error;
mod executor;
mod network;
mod registry;
mod tools;

pub use context::ToolContext;
pub use error::{ToolError, ToolOutcome};
pub use executor::{is_network_gated, ToolExecutor, ToolInvocationResult, ToolMetrics};
pub use network::{NetworkMode, NetworkPolicy};
pub use registry::ToolRegistry;
pub use tools::{
    CodeSearchTool, DownloadFileTool, ExecutePythonTool, GitBranchTool, GitCommitTool,
    GitDiffTool, GitLogTool, GitStatusTool, HttpRequestTool, LintCodeTool, ListDirectoryTool,
    ReadFileTool, RunTestsTool, SearchFilesTool, WebSearchTool, WriteFileTool,
};

use serde_json::Value;

/// Which bucket of the tool catalog a tool belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolCategory {
    /// Filesystem read/write/search operations.
    File,
    /// Code execution, tests, and lint.
    Code,
    /// Git inspection and mutation.
    Git,
    /// Outbound web requests.
    Web,
    /// Codebase/semantic search.
    Search,
}

/// Network posture of a tool, checked against the process-wide
/// [`NetworkPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkType {
    /// No network access at all.
    Local,
    /// Network access confined to the local machine/workspace.
    Internal,
    /// Calls an external API; blocked in `offline` mode.
    ExternalApi,
    /// One-way ingress from the network (a download); permitted even in
    /// `offline` mode since it cannot exfiltrate local data.
    ExternalDownload,
}

/// The contract every callable tool implements.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Stable tool name, used for lookup and in `tool_call_request` events.
    fn name(&self) -> &'static str;

    /// Which catalog bucket this tool belongs to.
    fn category(&self) -> ToolCategory;

    /// Network posture, checked by the registry and executor before running.
    fn network_type(&self) -> NetworkType;

    /// JSON schema describing accepted parameters.
    fn parameters_schema(&self) -> Value;

    /// Run the tool. Implementations validate their own `params` and return
    /// [`ToolError::InvalidParams`] (never retried) for malformed input.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolOutcome;
}

