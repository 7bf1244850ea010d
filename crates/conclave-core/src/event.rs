//! The typed event union streamed to Event Bus subscribers (C8 data model).

use crate::agent_output::StageMetrics;
use crate::artifact::Artifact;
use crate::hitl::{CheckpointType, HitlResponseAction};
use crate::ids::{RequestId, StageId, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The tagged union of everything the engine can publish.
///
/// Every variant carries `workflow_id`, `monotonic_seq`, and a timestamp via
/// the enclosing [`Event`] envelope rather than duplicating them per-variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// A stage began executing.
    StageStarted {
        /// Stage that started.
        stage_id: StageId,
    },
    /// A streaming text chunk from a running stage's handler.
    StageStreamChunk {
        /// Stage producing the chunk.
        stage_id: StageId,
        /// Chunk text.
        delta: String,
    },
    /// A stage finished successfully.
    StageCompleted {
        /// Stage that completed.
        stage_id: StageId,
        /// Execution metrics.
        metrics: StageMetrics,
    },
    /// A stage finished with a failure.
    StageFailed {
        /// Stage that failed.
        stage_id: StageId,
        /// Failure reason.
        reason: String,
        /// Whether this failure is retriable.
        transient: bool,
    },
    /// An artifact was applied to the workspace.
    ArtifactApplied {
        /// Stage that produced the artifact.
        stage_id: StageId,
        /// The applied artifact.
        artifact: Artifact,
    },
    /// A stage raised a HITL checkpoint.
    HitlRequested {
        /// The new request's id.
        request_id: RequestId,
        /// Stage that raised it.
        stage_id: StageId,
        /// Kind of checkpoint.
        checkpoint_type: CheckpointType,
        /// Title shown to the user.
        title: String,
    },
    /// A HITL checkpoint was resolved by a human response.
    HitlResolved {
        /// The resolved request's id.
        request_id: RequestId,
        /// The decision taken.
        action: HitlResponseAction,
    },
    /// A HITL checkpoint was cancelled.
    HitlCancelled {
        /// The cancelled request's id.
        request_id: RequestId,
        /// Why it was cancelled.
        reason: String,
    },
    /// A HITL checkpoint's deadline elapsed unanswered.
    HitlExpired {
        /// The expired request's id.
        request_id: RequestId,
    },
    /// The workflow reached a terminal success state.
    WorkflowCompleted {
        /// Final user-facing summary text.
        summary: String,
    },
    /// The workflow reached a terminal failure state.
    WorkflowFailed {
        /// Failure reason tag (e.g. `deadline_exceeded`, `resource_exhausted`).
        reason: String,
        /// Human-readable details (not leaked to end users verbatim).
        details: String,
    },
    /// The workflow was cancelled.
    WorkflowCancelled,
    /// The workflow was admitted to the queue and is waiting for capacity.
    Queued {
        /// Estimated FIFO position (0 = next).
        position: usize,
    },
    /// Sent to a newly (re)connected subscriber after it resumes from a pause.
    ResumedFrom {
        /// The sequence number after which live events continue.
        seq: u64,
    },
    /// Sent to a subscriber whose buffer overflowed, before the next event.
    Dropped {
        /// Number of events dropped since the last successful delivery.
        count: u64,
    },
    /// A full `WorkflowState` projection, sent to resynchronize a subscriber
    /// after a `Dropped` marker.
    Snapshot {
        /// Serialized `WorkflowState` projection.
        state: serde_json::Value,
    },
    /// Periodic keep-alive with no semantic content.
    Heartbeat,
}

impl EventKind {
    /// The event's wire tag (matches the `type` field in JSON).
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StageStarted { .. } => "stage_started",
            Self::StageStreamChunk { .. } => "stage_stream_chunk",
            Self::StageCompleted { .. } => "stage_completed",
            Self::StageFailed { .. } => "stage_failed",
            Self::ArtifactApplied { .. } => "artifact_applied",
            Self::HitlRequested { .. } => "hitl_requested",
            Self::HitlResolved { .. } => "hitl_resolved",
            Self::HitlCancelled { .. } => "hitl_cancelled",
            Self::HitlExpired { .. } => "hitl_expired",
            Self::WorkflowCompleted { .. } => "workflow_completed",
            Self::WorkflowFailed { .. } => "workflow_failed",
            Self::WorkflowCancelled => "workflow_cancelled",
            Self::Queued { .. } => "queued",
            Self::ResumedFrom { .. } => "resumed_from",
            Self::Dropped { .. } => "dropped",
            Self::Snapshot { .. } => "snapshot",
            Self::Heartbeat => "heartbeat",
        }
    }
}

/// An envelope around an [`EventKind`] carrying the fields every event bears.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// The workflow this event belongs to.
    pub workflow_id: WorkflowId,
    /// Strictly increasing, dense sequence number for this workflow.
    pub monotonic_seq: u64,
    /// Wall-clock time the event was published.
    pub timestamp: DateTime<Utc>,
    /// The event payload.
    pub kind: EventKind,
}

impl Event {
    /// Construct an event with the current time.
    #[must_use]
    pub fn new(workflow_id: WorkflowId, monotonic_seq: u64, kind: EventKind) -> Self {
        Self {
            workflow_id,
            monotonic_seq,
            timestamp: Utc::now(),
            kind,
        }
    }

    /// The event's wire tag.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }
}

/// Per-session sequencing, independent of the per-workflow sequence carried
/// in [`Event`]. Used by the Event Bus to order deliveries to a subscriber
/// across multiple workflows in the same session.
pub type SessionSeq = u64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_matches_serde_tag() {
        let event = Event::new(WorkflowId::new(), 0, EventKind::WorkflowCancelled);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"]["type"], "workflow_cancelled");
        assert_eq!(event.event_type(), "workflow_cancelled");
    }
}
