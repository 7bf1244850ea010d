//! Catalog of callable tools.

use crate::network::NetworkPolicy;
use crate::tools::{
    CodeSearchTool, DownloadFileTool, ExecutePythonTool, GitBranchTool, GitCommitTool,
    GitDiffTool, GitLogTool, GitStatusTool, HttpRequestTool, LintCodeTool, ListDirectoryTool,
    ReadFileTool, RunTestsTool, SearchFilesTool, WebSearchTool, WriteFileTool,
};
use crate::{NetworkType, Tool, ToolCategory};
use std::collections::HashMap;

/// Read-only after startup: the set of registered tools never changes once
/// constructed, only the [`NetworkPolicy`] cell mutates at runtime, per the
/// "no process-wide mutable singletons beyond a read-only configuration
/// cell" design note.
pub struct ToolRegistry {
    tools: HashMap<&'static str, Box<dyn Tool>>,
    policy: NetworkPolicy,
}

impl ToolRegistry {
    /// Construct an empty registry under the given network policy.
    #[must_use]
    pub fn new(policy: NetworkPolicy) -> Self {
        Self {
            tools: HashMap::new(),
            policy,
        }
    }

    /// Construct a registry with all 16 enumerated tools registered.
    #[must_use]
    pub fn with_defaults(policy: NetworkPolicy) -> Self {
        let mut registry = Self::new(policy);
        registry.register(Box::new(ReadFileTool));
        registry.register(Box::new(WriteFileTool));
        registry.register(Box::new(SearchFilesTool));
        registry.register(Box::new(ListDirectoryTool));
        registry.register(Box::new(ExecutePythonTool));
        registry.register(Box::new(RunTestsTool));
        registry.register(Box::new(LintCodeTool));
        registry.register(Box::new(GitStatusTool));
        registry.register(Box::new(GitDiffTool));
        registry.register(Box::new(GitLogTool));
        registry.register(Box::new(GitBranchTool));
        registry.register(Box::new(GitCommitTool));
        registry.register(Box::new(CodeSearchTool));
        registry.register(Box::new(WebSearchTool::default()));
        registry.register(Box::new(HttpRequestTool::default()));
        registry.register(Box::new(DownloadFileTool::default()));
        registry
    }

    /// Register a tool, keyed by its name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name(), tool);
    }

    /// Look up a tool by name, checking availability under the current
    /// network mode.
    ///
    /// This is the first of two availability checks; the second,
    /// authoritative check happens in [`crate::ToolExecutor::invoke`] to
    /// close the race between lookup and execution.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        let tool = self.tools.get(name)?.as_ref();
        if self.policy.allows(tool.network_type()) {
            Some(tool)
        } else {
            None
        }
    }

    /// Look up a tool ignoring network availability (used by the executor,
    /// which performs its own authoritative check).
    #[must_use]
    pub fn get_unchecked(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(AsRef::as_ref)
    }

    /// The shared network policy cell.
    #[must_use]
    pub fn policy(&self) -> &NetworkPolicy {
        &self.policy
    }

    /// All registered tool names, for diagnostics and the `/tools/execute`
    /// surface.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.tools.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Tools in a given category.
    #[must_use]
    pub fn by_category(&self, category: ToolCategory) -> Vec<&dyn Tool> {
        self.tools
            .values()
            .map(AsRef::as_ref)
            .filter(|t| t.category() == category)
            .collect()
    }

    /// Tools of a given network type.
    #[must_use]
    pub fn by_network_type(&self, network_type: NetworkType) -> Vec<&dyn Tool> {
        self.tools
            .values()
            .map(AsRef::as_ref)
            .filter(|t| t.network_type() == network_type)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkMode;

    #[test]
    fn with_defaults_registers_all_sixteen() {
        let registry = ToolRegistry::with_defaults(NetworkPolicy::default());
        assert_eq!(registry.names().len(), 16);
    }

    #[test]
    fn offline_mode_hides_web_search_but_keeps_download() {
        let registry = ToolRegistry::with_defaults(NetworkPolicy::new(NetworkMode::Offline));
        assert!(registry.get("web_search").is_none());
        assert!(registry.get("download_file").is_some());
        assert!(registry.get_unchecked("web_search").is_some());
    }
}
