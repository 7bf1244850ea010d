//! Shared context available to every built-in tool invocation.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Per-invocation context a tool reads from.
///
/// Carries `workspace_root` plus a persistent, lock-guarded `cwd` shared
/// across `bash` invocations within a session, and this runtime's one
/// network-mode cell.
pub struct ToolContext {
    /// Session workspace root every tool call is confined to.
    pub workspace_root: PathBuf,
    /// Working directory, persists across `execute_python`/git invocations
    /// within one session.
    pub cwd: Arc<RwLock<PathBuf>>,
}

impl ToolContext {
    /// Construct a context rooted at `workspace_root`, with `cwd` starting
    /// at the same path.
    #[must_use]
    pub fn new(workspace_root: PathBuf) -> Self {
        let cwd = Arc::new(RwLock::new(workspace_root.clone()));
        Self { workspace_root, cwd }
    }

    /// Construct a context that shares an existing `cwd` handle, e.g. across
    /// stages of the same session.
    #[must_use]
    pub fn with_shared_cwd(workspace_root: PathBuf, cwd: Arc<RwLock<PathBuf>>) -> Self {
        Self { workspace_root, cwd }
    }
}
