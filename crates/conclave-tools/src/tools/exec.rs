//! Code-category tools: `execute_python`, `run_tests`, `lint_code`.
//!
//! Uses `tokio::process::Command` with a `tokio::time::timeout` wrapper,
//! specialized to three fixed command shapes instead of an arbitrary shell
//! string.

use super::truncate_output;
use crate::{NetworkType, Tool, ToolCategory, ToolContext, ToolError, ToolOutcome};
use serde_json::Value;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

async fn run_command(
    program: &str,
    args: &[&str],
    cwd: &std::path::Path,
) -> ToolOutcome {
    let child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ToolError::System(format!("failed to spawn {program}: {e}")))?;

    let output = timeout(COMMAND_TIMEOUT, child.wait_with_output())
        .await
        .map_err(|_| ToolError::Timeout(COMMAND_TIMEOUT.as_millis() as u64))?
        .map_err(|e| ToolError::System(e.to_string()))?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.is_empty() {
        combined.push_str("\n--- stderr ---\n");
        combined.push_str(&stderr);
    }
    if !output.status.success() {
        let code = output.status.code().unwrap_or(-1);
        return Err(ToolError::ExecutionFailed(format!(
            "{program} exited with status {code}\n{combined}"
        )));
    }
    Ok(truncate_output(combined))
}

/// Runs a Python script (or inline `-c` snippet) inside the workspace.
pub struct ExecutePythonTool;

#[async_trait::async_trait]
impl Tool for ExecutePythonTool {
    fn name(&self) -> &'static str {
        "execute_python"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Code
    }

    fn network_type(&self) -> NetworkType {
        NetworkType::Local
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "code": {"type": "string", "description": "Python source to execute via `python3 -c`"},
                "script_path": {"type": "string", "description": "Path to a script to run instead of `code`"}
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolOutcome {
        let cwd = ctx.cwd.read().await.clone();
        if let Some(script) = params.get("script_path").and_then(Value::as_str) {
            return run_command("python3", &[script], &cwd).await;
        }
        let code = params
            .get("code")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidParams("code or script_path is required".into()))?;
        run_command("python3", &["-c", code], &cwd).await
    }
}

/// Runs the project's test suite (`cargo test` by default).
pub struct RunTestsTool;

#[async_trait::async_trait]
impl Tool for RunTestsTool {
    fn name(&self) -> &'static str {
        "run_tests"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Code
    }

    fn network_type(&self) -> NetworkType {
        NetworkType::Local
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "filter": {"type": "string", "description": "Test name filter passed through to the runner"}
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolOutcome {
        let cwd = ctx.cwd.read().await.clone();
        match params.get("filter").and_then(Value::as_str) {
            Some(filter) => run_command("cargo", &["test", filter], &cwd).await,
            None => run_command("cargo", &["test"], &cwd).await,
        }
    }
}

/// Runs the project's linter (`cargo clippy` by default).
pub struct LintCodeTool;

#[async_trait::async_trait]
impl Tool for LintCodeTool {
    fn name(&self) -> &'static str {
        "lint_code"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Code
    }

    fn network_type(&self) -> NetworkType {
        NetworkType::Local
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> ToolOutcome {
        let cwd = ctx.cwd.read().await.clone();
        run_command("cargo", &["clippy", "--all-targets", "--message-format=short"], &cwd).await
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
    async fn execute_python_runs_inline_code() {
        let dir = TempDir::new().unwrap();
        let result = ExecutePythonTool
            .execute(serde_json::json!({"code": "print(1 + 1)"}), &ctx(dir.path()))
            .await;
        match result {
            Ok(out) => assert!(out.contains('2')),
            Err(ToolError::System(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    #[tokio::test]
    async fn execute_python_requires_code_or_path() {
        let dir = TempDir::new().unwrap();
        let result = ExecutePythonTool.execute(serde_json::json!({}), &ctx(dir.path())).await;
        assert!(matches!(result, Err(ToolError::InvalidParams(_))));
    }
}
