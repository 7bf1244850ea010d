//! The immutable request that starts a workflow.

use crate::ids::{SessionId, WorkflowId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single turn of prior conversation, carried for Supervisor context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// `"user"` or `"assistant"`.
    pub role: String,
    /// Turn text.
    pub content: String,
}

/// Request-scoped feature flags, consolidated from env vars at startup
/// by `conclave-config` and threaded through per-request where they can
/// reasonably vary (e.g. `enable_dynamic_hitl` toggled per caller).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestFlags {
    /// Extra key/value flags not otherwise modeled, passed through verbatim.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Immutable once created. Starts exactly one workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// The workflow this request starts.
    pub workflow_id: WorkflowId,
    /// The session this workflow belongs to.
    pub session_id: SessionId,
    /// The user's natural-language message.
    pub user_message: String,
    /// Absolute or session-relative workspace root hint.
    pub workspace_root: Option<String>,
    /// Prior conversation turns for this session.
    pub conversation_history: Vec<ConversationTurn>,
    /// Per-request flags.
    pub flags: RequestFlags,
}

impl Request {
    /// Construct a request for a brand-new workflow on `session_id`.
    #[must_use]
    pub fn new(session_id: SessionId, user_message: impl Into<String>) -> Self {
        Self {
            workflow_id: WorkflowId::new(),
            session_id,
            user_message: user_message.into(),
            workspace_root: None,
            conversation_history: Vec::new(),
            flags: RequestFlags::default(),
        }
    }
}

