//! The structured output a handler produces once a stage completes.

use crate::artifact::Artifact;
use crate::hitl::HitlRequest;
use crate::plan::AgentRole;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Token/latency accounting for a single stage invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageMetrics {
    /// Prompt tokens consumed.
    pub tokens: usize,
    /// Wall-clock elapsed time, in milliseconds.
    pub elapsed_ms: u64,
    /// Number of retry attempts actually taken.
    pub retry_count: u32,
}

/// A tool call a handler wants the engine to dispatch through C1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Tool name as registered in the Tool Registry.
    pub tool_name: String,
    /// Tool parameters.
    pub params: Value,
}

/// The full structured output of one stage invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutput {
    /// The role that produced this output.
    pub role: AgentRole,
    /// Free-text response (e.g. the `quick_qa` answer, or a summary).
    pub text: String,
    /// File artifacts produced, not yet applied.
    pub artifacts: Vec<Artifact>,
    /// Shared-context writes this stage wants committed.
    pub context_writes: HashMap<String, Value>,
    /// Tool calls requested during execution (already dispatched by the
    /// time `AgentOutput` is finalized; retained for the access/audit log).
    pub tool_calls: Vec<ToolCallRequest>,
    /// Execution metrics.
    pub metrics: StageMetrics,
    /// A HITL checkpoint the handler wants to raise, if any.
    pub hitl_request: Option<HitlRequest>,
    /// Set by Reviewer/Gate handlers to request a refinement iteration.
    pub needs_refine: bool,
    /// Issues/findings accumulated by Reviewer/QA/Security handlers, fed
    /// back into a Refiner stage when `needs_refine` is set.
    pub issues: Vec<String>,
}

impl AgentOutput {
    /// Construct a bare output with no artifacts, writes, or side effects.
    #[must_use]
    pub fn new(role: AgentRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            artifacts: Vec::new(),
            context_writes: HashMap::new(),
            tool_calls: Vec::new(),
            metrics: StageMetrics::default(),
            hitl_request: None,
            needs_refine: false,
            issues: Vec::new(),
        }
    }
}
