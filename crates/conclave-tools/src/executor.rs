//! Timeout-bounded, cancellable tool invocation.

use crate::context::ToolContext;
use crate::registry::ToolRegistry;
use crate::{NetworkType, ToolError};
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Execution metrics attached to every [`ToolInvocationResult`].
#[derive(Debug, Clone, Default)]
pub struct ToolMetrics {
    /// Wall-clock time the invocation took, in milliseconds.
    pub elapsed_ms: u64,
}

/// `{success, output, error?, metrics}` returned from one tool invocation.
#[derive(Debug, Clone)]
pub struct ToolInvocationResult {
    /// Whether the tool completed successfully.
    pub success: bool,
    /// Tool output text (empty on failure).
    pub output: String,
    /// Error detail, set when `success` is false.
    pub error: Option<String>,
    /// Execution metrics.
    pub metrics: ToolMetrics,
}

impl ToolInvocationResult {
    fn ok(output: String, elapsed_ms: u64) -> Self {
        Self {
            success: true,
            output,
            error: None,
            metrics: ToolMetrics { elapsed_ms },
        }
    }

    fn err(error: ToolError, elapsed_ms: u64) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.to_string()),
            metrics: ToolMetrics { elapsed_ms },
        }
    }
}

/// Dispatches a named tool call through the [`ToolRegistry`], bounding it by
/// a per-call timeout and a cooperative [`CancellationToken`].
///
/// Wraps every invocation in a `tokio::time::timeout`, racing a cancellation
/// token so that a tool never outlives its deadline even if the invocation
/// itself ignores cancellation internally.
pub struct ToolExecutor<'a> {
    registry: &'a ToolRegistry,
}

impl<'a> ToolExecutor<'a> {
    /// Construct an executor over `registry`.
    #[must_use]
    pub fn new(registry: &'a ToolRegistry) -> Self {
        Self { registry }
    }

    /// Invoke `tool_name` with `params`, bounded by `deadline` and
    /// cancellable via `cancel`.
    ///
    /// Performs the second, authoritative network-mode availability check:
    /// a tool that passed `ToolRegistry::get` at plan time can still be
    /// rejected here if the mode flipped to `offline` in between.
    pub async fn invoke(
        &self,
        tool_name: &str,
        params: Value,
        ctx: &ToolContext,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> ToolInvocationResult {
        let started = Instant::now();
        let Some(tool) = self.registry.get_unchecked(tool_name) else {
            return ToolInvocationResult::err(
                ToolError::UnknownTool(tool_name.to_owned()),
                elapsed_ms(started),
            );
        };

        if !self.registry.policy().allows(tool.network_type()) {
            warn!(tool = tool_name, mode = %self.registry.policy().mode(), "tool rejected by network policy at execute time");
            return ToolInvocationResult::err(
                ToolError::UnavailableInMode(self.registry.policy().mode().to_string()),
                elapsed_ms(started),
            );
        }

        let run = tool.execute(params, ctx);
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                ToolInvocationResult::err(ToolError::Cancelled, elapsed_ms(started))
            }
            outcome = tokio::time::timeout(deadline, run) => {
                match outcome {
                    Ok(Ok(output)) => ToolInvocationResult::ok(output, elapsed_ms(started)),
                    Ok(Err(e)) => ToolInvocationResult::err(e, elapsed_ms(started)),
                    Err(_) => ToolInvocationResult::err(
                        ToolError::Timeout(deadline.as_millis() as u64),
                        elapsed_ms(started),
                    ),
                }
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Whether `network_type` is gated by offline mode, exposed for callers that
/// want to pre-filter without going through a registry (e.g. the Supervisor
/// deciding whether to even plan a stage that would need `web_search`).
#[must_use]
pub fn is_network_gated(network_type: NetworkType) -> bool {
    matches!(network_type, NetworkType::ExternalApi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{NetworkMode, NetworkPolicy};
    use crate::registry::ToolRegistry;
    use std::path::PathBuf;

    #[tokio::test]
    async fn unknown_tool_is_reported_without_panic() {
        let registry = ToolRegistry::with_defaults(NetworkPolicy::default());
        let executor = ToolExecutor::new(&registry);
        let ctx = ToolContext::new(PathBuf::from("/tmp"));
        let cancel = CancellationToken::new();
        let result = executor
            .invoke("nonexistent", serde_json::json!({}), &ctx, Duration::from_secs(1), &cancel)
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("unknown tool"));
    }

    #[tokio::test]
    async fn offline_mode_rejects_external_api_tool_at_execute_time() {
        let registry = ToolRegistry::with_defaults(NetworkPolicy::new(NetworkMode::Offline));
        let executor = ToolExecutor::new(&registry);
        let ctx = ToolContext::new(PathBuf::from("/tmp"));
        let cancel = CancellationToken::new();
        let result = executor
            .invoke(
                "web_search",
                serde_json::json!({"query": "rust async"}),
                &ctx,
                Duration::from_secs(1),
                &cancel,
            )
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("offline"));
    }

    #[tokio::test]
    async fn cancellation_wins_the_race_immediately() {
        let registry = ToolRegistry::with_defaults(NetworkPolicy::default());
        let executor = ToolExecutor::new(&registry);
        let ctx = ToolContext::new(PathBuf::from("/tmp"));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = executor
            .invoke(
                "read_file",
                serde_json::json!({"path": "does-not-matter.txt"}),
                &ctx,
                Duration::from_secs(5),
                &cancel,
            )
            .await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("cancelled"));
    }
}
