//! File-category tools: `read_file`, `write_file`, `search_files`,
//! `list_directory`.
//!
//! Line-numbered reads with an offset/limit window, atomic-enough writes
//! that create parent directories, and mtime-sorted glob matching confined
//! to a root directory.

use super::truncate_output;
use crate::{NetworkType, Tool, ToolCategory, ToolContext, ToolError, ToolOutcome};
use serde_json::Value;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::SystemTime;

const DEFAULT_LINE_LIMIT: usize = 2000;
const MAX_LINE_LENGTH: usize = 2000;

/// Reads a file from the filesystem, `cat -n` style.
pub struct ReadFileTool;

#[async_trait::async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::File
    }

    fn network_type(&self) -> NetworkType {
        NetworkType::Local
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path relative to the session workspace"},
                "offset": {"type": "integer", "description": "1-based line to start reading from"},
                "limit": {"type": "integer", "description": "Number of lines to read (default 2000)"}
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolOutcome {
        let path = params
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidParams("path is required".into()))?;
        let offset = params
            .get("offset")
            .and_then(Value::as_u64)
            .map(|v| v as usize);
        let limit = params
            .get("limit")
            .and_then(Value::as_u64)
            .map_or(DEFAULT_LINE_LIMIT, |v| v as usize);

        let full = ctx.workspace_root.join(path);
        if !full.exists() {
            return Err(ToolError::PathNotFound(path.to_owned()));
        }

        let raw = tokio::fs::read(&full).await?;
        let check_len = raw.len().min(8192);
        if raw[..check_len].contains(&0) {
            return Err(ToolError::ExecutionFailed(format!("{path} appears to be a binary file")));
        }
        let content = String::from_utf8(raw)
            .map_err(|_| ToolError::ExecutionFailed(format!("{path} is not valid UTF-8")))?;

        let lines: Vec<&str> = content.lines().collect();
        let total = lines.len();
        let start = offset.map_or(0, |o| o.saturating_sub(1));
        let end = start.saturating_add(limit).min(total);
        if start >= total {
            return Ok(format!("(file has {total} lines, offset {start} is past end)"));
        }

        let mut out = String::new();
        for (idx, &line) in lines[start..end].iter().enumerate() {
            let line_num = start.saturating_add(idx).saturating_add(1);
            let display = if line.len() > MAX_LINE_LENGTH { &line[..MAX_LINE_LENGTH] } else { line };
            let _ = writeln!(out, "{line_num:>6}\t{display}");
        }
        if end < total {
            let _ = write!(out, "\n(showing lines {}-{end} of {total})", start.saturating_add(1));
        }
        Ok(truncate_output(out))
    }
}

/// Writes content to a file, creating parent directories as needed.
pub struct WriteFileTool;

#[async_trait::async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::File
    }

    fn network_type(&self) -> NetworkType {
        NetworkType::Local
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "content": {"type": "string"}
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolOutcome {
        let path = params
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidParams("path is required".into()))?;
        let content = params
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidParams("content is required".into()))?;

        let full = ctx.workspace_root.join(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, content).await?;
        Ok(format!("Wrote {} bytes to {path}", content.len()))
    }
}

/// Finds files under the workspace matching a glob pattern, sorted by mtime
/// (most recent first).
pub struct SearchFilesTool;

#[async_trait::async_trait]
impl Tool for SearchFilesTool {
    fn name(&self) -> &'static str {
        "search_files"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::File
    }

    fn network_type(&self) -> NetworkType {
        NetworkType::Local
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string", "description": "Glob pattern, e.g. \"**/*.rs\""},
                "path": {"type": "string", "description": "Subdirectory to search (defaults to workspace root)"}
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolOutcome {
        let pattern = params
            .get("pattern")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidParams("pattern is required".into()))?
            .to_owned();
        let search_dir = params
            .get("path")
            .and_then(Value::as_str)
            .map_or_else(|| ctx.workspace_root.clone(), |p| ctx.workspace_root.join(p));

        if !search_dir.exists() {
            return Err(ToolError::PathNotFound(search_dir.display().to_string()));
        }
        let search_dir = search_dir.canonicalize()?;

        let glob = globset::GlobBuilder::new(&pattern)
            .literal_separator(false)
            .build()
            .map_err(|e| ToolError::InvalidParams(format!("invalid glob pattern: {e}")))?
            .compile_matcher();

        let mut matches: Vec<(PathBuf, SystemTime)> = Vec::new();
        for entry in walkdir::WalkDir::new(&search_dir)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || e.file_name().to_str().is_none_or(|s| !s.starts_with('.')))
        {
            let Ok(entry) = entry else { continue };
            if entry.file_type().is_dir() {
                continue;
            }
            let rel = entry.path().strip_prefix(&search_dir).unwrap_or(entry.path());
            if glob.is_match(rel) {
                let mtime = entry.metadata().ok().and_then(|m| m.modified().ok()).unwrap_or(SystemTime::UNIX_EPOCH);
                matches.push((entry.path().to_path_buf(), mtime));
            }
        }
        matches.sort_by(|a, b| b.1.cmp(&a.1));

        if matches.is_empty() {
            return Ok(format!("No files matching \"{pattern}\" found"));
        }
        let mut out = String::new();
        for (path, _) in &matches {
            out.push_str(&path.display().to_string());
            out.push('\n');
        }
        let _ = write!(out, "\n({} files matched)", matches.len());
        Ok(truncate_output(out))
    }
}

/// Lists the immediate contents of a directory.
pub struct ListDirectoryTool;

#[async_trait::async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &'static str {
        "list_directory"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::File
    }

    fn network_type(&self) -> NetworkType {
        NetworkType::Local
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Subdirectory to list (defaults to workspace root)"},
                "depth": {"type": "integer", "description": "Recursion depth (default 1, i.e. immediate children only)"}
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolOutcome {
        let target = params
            .get("path")
            .and_then(Value::as_str)
            .map_or_else(|| ctx.workspace_root.clone(), |p| ctx.workspace_root.join(p));
        let depth = params.get("depth").and_then(Value::as_u64).unwrap_or(1) as usize;

        if !target.exists() {
            return Err(ToolError::PathNotFound(target.display().to_string()));
        }

        let mut entries: Vec<String> = Vec::new();
        for entry in walkdir::WalkDir::new(&target)
            .min_depth(1)
            .max_depth(depth.max(1))
            .follow_links(false)
        {
            let Ok(entry) = entry else { continue };
            let rel = entry.path().strip_prefix(&target).unwrap_or(entry.path());
            let marker = if entry.file_type().is_dir() { "/" } else { "" };
            entries.push(format!("{}{marker}", rel.display()));
        }
        entries.sort();

        if entries.is_empty() {
            return Ok("(empty directory)".to_owned());
        }
        Ok(truncate_output(entries.join("\n")))
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
    async fn read_file_reports_line_numbers() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "one\ntwo\nthree\n").unwrap();
        let out = ReadFileTool
            .execute(serde_json::json!({"path": "a.txt"}), &ctx(dir.path()))
            .await
            .unwrap();
        assert!(out.contains("     1\tone"));
        assert!(out.contains("     3\tthree"));
    }

    #[tokio::test]
    async fn read_file_missing_path_errors() {
        let dir = TempDir::new().unwrap();
        let result = ReadFileTool.execute(serde_json::json!({"path": "nope.txt"}), &ctx(dir.path())).await;
        assert!(matches!(result, Err(ToolError::PathNotFound(_))));
    }

    #[tokio::test]
    async fn write_file_creates_parents() {
        let dir = TempDir::new().unwrap();
        WriteFileTool
            .execute(serde_json::json!({"path": "a/b/c.txt", "content": "hi"}), &ctx(dir.path()))
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("a/b/c.txt")).unwrap(), "hi");
    }

    #[tokio::test]
    async fn search_files_matches_glob_sorted_by_mtime() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.rs"), "").unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        let out = SearchFilesTool
            .execute(serde_json::json!({"pattern": "*.rs"}), &ctx(dir.path()))
            .await
            .unwrap();
        assert!(out.contains("a.rs"));
        assert!(!out.contains("b.txt"));
    }

    #[tokio::test]
    async fn list_directory_lists_immediate_children() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("f.txt"), "").unwrap();
        let out = ListDirectoryTool.execute(serde_json::json!({}), &ctx(dir.path())).await.unwrap();
        assert!(out.contains("sub/"));
        assert!(out.contains("f.txt"));
    }
}
