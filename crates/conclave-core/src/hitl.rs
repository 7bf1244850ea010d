//! Human-in-the-loop checkpoint types (C6 data model).

use crate::ids::{RequestId, StageId, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What kind of decision a HITL checkpoint is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointType {
    /// A yes/no gate before a sensitive or irreversible step.
    Approval,
    /// A request to look over produced artifacts.
    Review,
    /// A request to edit content before it proceeds.
    Edit,
    /// A request to pick among discrete options.
    Choice,
    /// A simple informational confirmation.
    Confirm,
    /// An open-ended question the Supervisor needs answered to proceed.
    Question,
}

/// A request for human input raised by a stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitlRequest {
    /// Unique request id.
    pub request_id: RequestId,
    /// The workflow raising this request.
    pub workflow_id: WorkflowId,
    /// The stage raising this request.
    pub stage_id: StageId,
    /// Kind of decision being requested.
    pub checkpoint_type: CheckpointType,
    /// Short title shown to the user.
    pub title: String,
    /// Longer description / context for the decision.
    pub description: String,
    /// Structured content relevant to the decision (e.g. diff, options list).
    pub content: Value,
    /// Priority, higher sorts first in `list_pending`.
    pub priority: i32,
    /// When the request was created.
    pub created_at: DateTime<Utc>,
    /// Optional per-request deadline. Absence means no deadline: deadlines
    /// are per-request, never per-workflow.
    pub deadline: Option<DateTime<Utc>>,
}

impl HitlRequest {
    /// Construct a request stamped with the current time and no deadline.
    #[must_use]
    pub fn new(
        workflow_id: WorkflowId,
        stage_id: StageId,
        checkpoint_type: CheckpointType,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            request_id: RequestId::new(),
            workflow_id,
            stage_id,
            checkpoint_type,
            title: title.into(),
            description: description.into(),
            content: Value::Null,
            priority: 0,
            created_at: Utc::now(),
            deadline: None,
        }
    }

    /// Builder: attach structured content.
    #[must_use]
    pub fn with_content(mut self, content: Value) -> Self {
        self.content = content;
        self
    }

    /// Builder: set a deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// The decision a human made on a `HitlRequest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitlResponseAction {
    /// Approve and proceed.
    Approve,
    /// Reject; the stage fails permanently.
    Reject,
    /// Proceed with edited content.
    Edit,
    /// Retry the stage as if it had not yet raised this request.
    Retry,
    /// A choice checkpoint's selected option.
    Select,
    /// Acknowledge a confirm checkpoint.
    Confirm,
    /// Cancel the workflow outright.
    Cancel,
}

/// A human's response to a `HitlRequest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitlResponse {
    /// Which request this responds to.
    pub request_id: RequestId,
    /// The decision taken.
    pub action: HitlResponseAction,
    /// Free-text feedback, if any.
    pub feedback: Option<String>,
    /// Edited content, for `Edit` responses.
    pub modified_content: Option<Value>,
    /// Selected option, for `Select` responses.
    pub selected_option: Option<String>,
}

impl HitlResponse {
    /// Construct a bare response with no optional fields set.
    #[must_use]
    pub fn new(request_id: RequestId, action: HitlResponseAction) -> Self {
        Self {
            request_id,
            action,
            feedback: None,
            modified_content: None,
            selected_option: None,
        }
    }
}

/// Terminal state of a `HitlRequest`'s own lifecycle, tracked by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitlRequestState {
    /// Awaiting a response.
    Pending,
    /// A response was recorded.
    Resolved,
    /// The request was cancelled (e.g. workflow cancellation).
    Cancelled,
    /// The deadline elapsed with no response.
    Expired,
}

impl HitlRequestState {
    /// Whether a response may still be accepted.
    #[must_use]
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Pending)
    }
}
