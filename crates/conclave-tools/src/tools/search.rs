//! Search-category tool: `code_search`, a grep-like regex search over the
//! workspace.
//!
//! A `walkdir` traversal paired with the `regex` crate for line matching
//! instead of filename globbing.

use super::truncate_output;
use crate::{NetworkType, Tool, ToolCategory, ToolContext, ToolError, ToolOutcome};
use serde_json::Value;
use std::fmt::Write as _;

const MAX_MATCHES: usize = 300;

/// Regex search across text files under the workspace, grep-style.
pub struct CodeSearchTool;

#[async_trait::async_trait]
impl Tool for CodeSearchTool {
    fn name(&self) -> &'static str {
        "code_search"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Search
    }

    fn network_type(&self) -> NetworkType {
        NetworkType::Local
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string", "description": "Regular expression to search for"},
                "path": {"type": "string", "description": "Subdirectory to search (defaults to workspace root)"},
                "file_glob": {"type": "string", "description": "Restrict to files matching this glob, e.g. \"*.rs\""}
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolOutcome {
        let pattern = params
            .get("pattern")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidParams("pattern is required".into()))?;
        let regex = regex::Regex::new(pattern)
            .map_err(|e| ToolError::InvalidParams(format!("invalid regex: {e}")))?;

        let search_dir = params
            .get("path")
            .and_then(Value::as_str)
            .map_or_else(|| ctx.workspace_root.clone(), |p| ctx.workspace_root.join(p));
        if !search_dir.exists() {
            return Err(ToolError::PathNotFound(search_dir.display().to_string()));
        }

        let file_glob = params
            .get("file_glob")
            .and_then(Value::as_str)
            .map(|g| {
                globset::GlobBuilder::new(g)
                    .literal_separator(false)
                    .build()
                    .map(|g| g.compile_matcher())
            })
            .transpose()
            .map_err(|e| ToolError::InvalidParams(format!("invalid file_glob: {e}")))?;

        let mut out = String::new();
        let mut match_count = 0usize;

        'walk: for entry in walkdir::WalkDir::new(&search_dir)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || e.file_name().to_str().is_none_or(|s| !s.starts_with('.') && s != "target"))
        {
            let Ok(entry) = entry else { continue };
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(glob) = &file_glob {
                let rel = entry.path().strip_prefix(&search_dir).unwrap_or(entry.path());
                if !glob.is_match(rel) {
                    continue;
                }
            }
            let Ok(content) = tokio::fs::read_to_string(entry.path()).await else {
                continue;
            };
            for (line_no, line) in content.lines().enumerate() {
                if regex.is_match(line) {
                    let _ = writeln!(out, "{}:{}: {}", entry.path().display(), line_no.saturating_add(1), line.trim());
                    match_count = match_count.saturating_add(1);
                    if match_count >= MAX_MATCHES {
                        let _ = writeln!(out, "\n(stopped after {MAX_MATCHES} matches)");
                        break 'walk;
                    }
                }
            }
        }

        if match_count == 0 {
            return Ok(format!("No matches for /{pattern}/"));
        }
        Ok(truncate_output(out))
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
    async fn finds_matching_lines() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn foo() {}\nfn bar() {}\n").unwrap();
        let out = CodeSearchTool
            .execute(serde_json::json!({"pattern": "fn bar"}), &ctx(dir.path()))
            .await
            .unwrap();
        assert!(out.contains("fn bar"));
        assert!(!out.contains("fn foo"));
    }

    #[tokio::test]
    async fn rejects_invalid_regex() {
        let dir = TempDir::new().unwrap();
        let result = CodeSearchTool
            .execute(serde_json::json!({"pattern": "("}), &ctx(dir.path()))
            .await;
        assert!(matches!(result, Err(ToolError::InvalidParams(_))));
    }

    #[tokio::test]
    async fn honors_file_glob_filter() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.rs"), "needle\n").unwrap();
        std::fs::write(dir.path().join("b.txt"), "needle\n").unwrap();
        let out = CodeSearchTool
            .execute(serde_json::json!({"pattern": "needle", "file_glob": "*.rs"}), &ctx(dir.path()))
            .await
            .unwrap();
        assert!(out.contains("a.rs"));
        assert!(!out.contains("b.txt"));
    }
}
