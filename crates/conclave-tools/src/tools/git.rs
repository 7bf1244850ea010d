//! Git-category tools: `git_status`, `git_diff`, `git_log`, `git_branch`,
//! `git_commit`.
//!
//! Spawns the `git` binary directly with fixed, validated argument shapes
//! rather than an arbitrary shell string.

use super::truncate_output;
use crate::{NetworkType, Tool, ToolCategory, ToolContext, ToolError, ToolOutcome};
use serde_json::Value;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};

const GIT_TIMEOUT: Duration = Duration::from_secs(30);

async fn run_git(args: &[&str], cwd: &std::path::Path) -> ToolOutcome {
    let child = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ToolError::System(format!("failed to spawn git: {e}")))?;

    let output = timeout(GIT_TIMEOUT, child.wait_with_output())
        .await
        .map_err(|_| ToolError::Timeout(GIT_TIMEOUT.as_millis() as u64))?
        .map_err(|e| ToolError::System(e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        return Err(ToolError::ExecutionFailed(format!("git {}: {stderr}", args.join(" "))));
    }
    Ok(truncate_output(String::from_utf8_lossy(&output.stdout).into_owned()))
}

/// Short-form `git status`.
pub struct GitStatusTool;

#[async_trait::async_trait]
impl Tool for GitStatusTool {
    fn name(&self) -> &'static str {
        "git_status"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Git
    }

    fn network_type(&self) -> NetworkType {
        NetworkType::Local
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> ToolOutcome {
        run_git(&["status", "--short", "--branch"], &ctx.workspace_root).await
    }
}

/// `git diff`, optionally restricted to a path and/or staged changes.
pub struct GitDiffTool;

#[async_trait::async_trait]
impl Tool for GitDiffTool {
    fn name(&self) -> &'static str {
        "git_diff"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Git
    }

    fn network_type(&self) -> NetworkType {
        NetworkType::Local
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "staged": {"type": "boolean", "description": "Show the staged (index) diff instead of the working tree"}
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolOutcome {
        let staged = params.get("staged").and_then(Value::as_bool).unwrap_or(false);
        let mut args: Vec<&str> = vec!["diff"];
        if staged {
            args.push("--staged");
        }
        let path = params.get("path").and_then(Value::as_str);
        if let Some(path) = path {
            args.push("--");
            args.push(path);
        }
        run_git(&args, &ctx.workspace_root).await
    }
}

/// `git log`, bounded by a commit count.
pub struct GitLogTool;

#[async_trait::async_trait]
impl Tool for GitLogTool {
    fn name(&self) -> &'static str {
        "git_log"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Git
    }

    fn network_type(&self) -> NetworkType {
        NetworkType::Local
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "max_count": {"type": "integer", "description": "Number of commits to show (default 20)"}
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolOutcome {
        let max_count = params.get("max_count").and_then(Value::as_u64).unwrap_or(20);
        let count_arg = format!("-{max_count}");
        run_git(
            &["log", &count_arg, "--oneline", "--decorate"],
            &ctx.workspace_root,
        )
        .await
    }
}

/// Lists or creates branches via `git branch`.
pub struct GitBranchTool;

#[async_trait::async_trait]
impl Tool for GitBranchTool {
    fn name(&self) -> &'static str {
        "git_branch"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Git
    }

    fn network_type(&self) -> NetworkType {
        NetworkType::Local
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "create": {"type": "string", "description": "Name of a new branch to create"}
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolOutcome {
        match params.get("create").and_then(Value::as_str) {
            Some(name) => run_git(&["branch", name], &ctx.workspace_root).await,
            None => run_git(&["branch", "--list", "-vv"], &ctx.workspace_root).await,
        }
    }
}

/// Stages all changes and commits with the given message.
pub struct GitCommitTool;

#[async_trait::async_trait]
impl Tool for GitCommitTool {
    fn name(&self) -> &'static str {
        "git_commit"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Git
    }

    fn network_type(&self) -> NetworkType {
        NetworkType::Local
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": {"type": "string"},
                "all": {"type": "boolean", "description": "Stage all tracked changes before committing (default true)"}
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolOutcome {
        let message = params
            .get("message")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidParams("message is required".into()))?;
        let stage_all = params.get("all").and_then(Value::as_bool).unwrap_or(true);
        if stage_all {
            run_git(&["add", "-A"], &ctx.workspace_root).await?;
        }
        run_git(&["commit", "-m", message], &ctx.workspace_root).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ctx(root: &std::path::Path) -> ToolContext {
        ToolContext::new(root.to_path_buf())
    }

    #[tokio::test]
    async fn git_commit_requires_message() {
        let dir = TempDir::new().unwrap();
        let result = GitCommitTool.execute(serde_json::json!({}), &ctx(dir.path())).await;
        assert!(matches!(result, Err(ToolError::InvalidParams(_))));
    }

    #[tokio::test]
    async fn git_status_on_non_repo_errors() {
        let dir = TempDir::new().unwrap();
        let result = GitStatusTool.execute(serde_json::json!({}), &ctx(dir.path())).await;
        assert!(result.is_err());
    }
}
