//! Web-category tools: `web_search`, `http_request`, `download_file`.
//!
//! A `reqwest::Client` is built once and reused across calls rather than
//! per-request.

use super::truncate_output;
use crate::{NetworkType, Tool, ToolCategory, ToolContext, ToolError, ToolOutcome};
use serde_json::Value;
use std::time::Duration;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_DOWNLOAD_BYTES: u64 = 100 * 1024 * 1024;

fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

/// Runs a web search via a configured search API and returns a digest of
/// results. Blocked entirely in `offline` mode.
pub struct WebSearchTool {
    client: reqwest::Client,
    endpoint: String,
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self {
            client: build_client(HTTP_TIMEOUT),
            endpoint: "https://api.duckduckgo.com/".to_owned(),
        }
    }
}

#[async_trait::async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &'static str {
        "web_search"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Web
    }

    fn network_type(&self) -> NetworkType {
        NetworkType::ExternalApi
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> ToolOutcome {
        let query = params
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidParams("query is required".into()))?;

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query), ("format", "json"), ("no_html", "1")])
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("search request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ToolError::ExecutionFailed(format!(
                "search endpoint returned {}",
                response.status()
            )));
        }
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("failed to read search response: {e}")))?;
        Ok(truncate_output(body))
    }
}

/// Performs an arbitrary outbound HTTP request.
pub struct HttpRequestTool {
    client: reqwest::Client,
}

impl Default for HttpRequestTool {
    fn default() -> Self {
        Self { client: build_client(HTTP_TIMEOUT) }
    }
}

#[async_trait::async_trait]
impl Tool for HttpRequestTool {
    fn name(&self) -> &'static str {
        "http_request"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Web
    }

    fn network_type(&self) -> NetworkType {
        NetworkType::ExternalApi
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {"type": "string"},
                "method": {"type": "string", "description": "HTTP method, default GET"},
                "body": {"type": "string"}
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> ToolOutcome {
        let url = params
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidParams("url is required".into()))?;
        let method_str = params.get("method").and_then(Value::as_str).unwrap_or("GET");
        let method = reqwest::Method::from_bytes(method_str.as_bytes())
            .map_err(|_| ToolError::InvalidParams(format!("invalid method {method_str}")))?;

        let mut request = self.client.request(method, url);
        if let Some(body) = params.get("body").and_then(Value::as_str) {
            request = request.body(body.to_owned());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("request failed: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("failed to read response body: {e}")))?;
        Ok(truncate_output(format!("HTTP {status}\n{body}")))
    }
}

/// Downloads a remote resource into the workspace. Permitted even in
/// `offline` mode (one-way ingress, see [`crate::NetworkType::ExternalDownload`]).
pub struct DownloadFileTool {
    client: reqwest::Client,
}

impl Default for DownloadFileTool {
    fn default() -> Self {
        Self { client: build_client(DOWNLOAD_TIMEOUT) }
    }
}

#[async_trait::async_trait]
impl Tool for DownloadFileTool {
    fn name(&self) -> &'static str {
        "download_file"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Web
    }

    fn network_type(&self) -> NetworkType {
        NetworkType::ExternalDownload
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {"type": "string"},
                "dest_path": {"type": "string", "description": "Path relative to the workspace to save to"}
            },
            "required": ["url", "dest_path"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolOutcome {
        let url = params
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidParams("url is required".into()))?;
        let dest_path = params
            .get("dest_path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidParams("dest_path is required".into()))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("download failed: {e}")))?;
        if !response.status().is_success() {
            return Err(ToolError::ExecutionFailed(format!(
                "download endpoint returned {}",
                response.status()
            )));
        }
        if let Some(len) = response.content_length() {
            if len > MAX_DOWNLOAD_BYTES {
                return Err(ToolError::ExecutionFailed(format!(
                    "remote file is {len} bytes, exceeds the {MAX_DOWNLOAD_BYTES} byte limit"
                )));
            }
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("failed to read download body: {e}")))?;
        if bytes.len() as u64 > MAX_DOWNLOAD_BYTES {
            return Err(ToolError::ExecutionFailed(format!(
                "downloaded {} bytes, exceeds the {MAX_DOWNLOAD_BYTES} byte limit",
                bytes.len()
            )));
        }

        let full = ctx.workspace_root.join(dest_path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, &bytes).await?;
        Ok(format!("Downloaded {} bytes to {dest_path}", bytes.len()))
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
    async fn web_search_requires_query() {
        let result = WebSearchTool::default()
            .execute(serde_json::json!({}), &ctx(&std::env::temp_dir()))
            .await;
        assert!(matches!(result, Err(ToolError::InvalidParams(_))));
    }

    #[tokio::test]
    async fn http_request_requires_url() {
        let result = HttpRequestTool::default()
            .execute(serde_json::json!({}), &ctx(&std::env::temp_dir()))
            .await;
        assert!(matches!(result, Err(ToolError::InvalidParams(_))));
    }

    #[tokio::test]
    async fn download_file_requires_url_and_dest() {
        let dir = TempDir::new().unwrap();
        let result = DownloadFileTool::default()
            .execute(serde_json::json!({"url": "https://example.com"}), &ctx(dir.path()))
            .await;
        assert!(matches!(result, Err(ToolError::InvalidParams(_))));
    }
}
