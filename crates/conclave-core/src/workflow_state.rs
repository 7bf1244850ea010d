//! The durable checkpoint record for a workflow (C7/C9 data model).

use crate::context_entry::{AccessLogEntry, ContextEntry};
use crate::hitl::HitlRequest;
use crate::ids::{SessionId, WorkflowId};
use crate::plan::{Plan, StageState};
use crate::request::Request;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Where a workflow sits in its overall lifecycle.
///
/// `created -> planning -> running <-> paused -> finalizing -> {completed,
/// failed, cancelled}`. `paused` records why the workflow is paused so a
/// resume can be validated against the same cause that induced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum WorkflowPhase {
    /// The workflow record exists but planning has not started.
    Created,
    /// The Supervisor/Planner is producing the initial `Plan`.
    Planning,
    /// Stages are actively being scheduled and executed.
    Running,
    /// Execution is suspended pending a HITL response.
    PausedHitl,
    /// Execution is suspended because the user explicitly paused it.
    PausedUser,
    /// All stages have reached a terminal state; the Aggregator is
    /// producing the final summary.
    Finalizing,
    /// Terminal: succeeded.
    Completed,
    /// Terminal: failed.
    Failed,
    /// Terminal: cancelled.
    Cancelled,
}

impl WorkflowPhase {
    /// Whether this phase is terminal (no further transitions are valid).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether this phase is one of the two paused variants.
    #[must_use]
    pub fn is_paused(self) -> bool {
        matches!(self, Self::PausedHitl | Self::PausedUser)
    }

    /// Validate a transition, returning the new phase on success or the
    /// rejected target on failure.
    ///
    /// `paused(user)` only ever resumes back to `running` carrying
    /// resubmitted feedback — there is no bare "unpause and continue as
    /// before" path.
    pub fn transition(self, to: Self) -> Result<Self, Self> {
        use WorkflowPhase::{
            Cancelled, Completed, Created, Failed, Finalizing, Planning, PausedHitl, PausedUser,
            Running,
        };
        let allowed = match (self, to) {
            (Created, Planning) => true,
            (Planning, Running) => true,
            (Running, PausedHitl | PausedUser | Finalizing | Failed | Cancelled) => true,
            (PausedHitl, Running | Cancelled) => true,
            (PausedUser, Running | Cancelled) => true,
            (Finalizing, Completed | Failed | Cancelled) => true,
            (Planning | Created, Cancelled) => true,
            (Planning, Failed) => true,
            _ => false,
        };
        if allowed {
            Ok(to)
        } else {
            Err(to)
        }
    }
}

/// Cursor marking how far a resumed workflow had progressed, so a resume
/// can skip already-completed stages idempotently.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowCursor {
    /// Stage ids already in a terminal state at the time of the last
    /// checkpoint.
    pub completed_stage_ids: Vec<String>,
    /// Number of checkpoints written so far, for diagnostics.
    pub checkpoint_count: u64,
    /// Number of refinement iterations (Refiner + re-check stage pairs)
    /// appended to the plan so far, checked against
    /// `max_refinement_iterations` so a resumed workflow does not lose
    /// count of how many it already ran.
    pub refinement_iterations: u32,
    /// Next Event Bus sequence number at the time of the last checkpoint,
    /// so a resume can seed the bus's counter and a reconnecting subscriber
    /// gets a `resumed_from{seq}` event rather than restarting at zero.
    pub last_event_seq: u64,
}

/// The full durable state of a workflow, sufficient to resume execution
/// after a process restart or an explicit pause/resume cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    /// The workflow this state belongs to.
    pub workflow_id: WorkflowId,
    /// The owning session.
    pub session_id: SessionId,
    /// The request that started this workflow, carried so a resumed run can
    /// rebuild `StageInput.request` for the Supervisor and Aggregator
    /// without a separate lookup.
    pub request: Request,
    /// The current phase.
    pub phase: WorkflowPhase,
    /// The current plan (may have been revised once per `revision_limit`).
    pub plan: Plan,
    /// Per-stage state, keyed by stage id string.
    pub stage_states: HashMap<String, StageState>,
    /// The shared-context blackboard, keyed by context key.
    pub shared_context: HashMap<String, ContextEntry>,
    /// Append-only access log for the shared context.
    pub access_log: Vec<AccessLogEntry>,
    /// Artifacts already applied to the session workspace, in apply order.
    pub artifacts_applied: Vec<String>,
    /// The HITL request currently blocking progress, if paused for HITL.
    pub pending_hitl: Option<HitlRequest>,
    /// Stage ids whose `requires_hitl` pre-run gate has been resolved
    /// (approved/confirmed/retried), so the scheduler may mark them ready.
    /// A stage with `requires_hitl = true` never appears as ready until its
    /// id lands here.
    pub hitl_cleared_stages: std::collections::HashSet<String>,
    /// Resume bookkeeping.
    pub cursor: WorkflowCursor,
    /// When this workflow was first submitted, so a resumed run computes
    /// its remaining deadline against the original submission time rather
    /// than granting a fresh budget on every restart.
    pub started_at: DateTime<Utc>,
}

impl WorkflowState {
    /// Construct a freshly created workflow state with an empty plan.
    #[must_use]
    pub fn new(workflow_id: WorkflowId, session_id: SessionId, request: Request) -> Self {
        Self {
            workflow_id,
            session_id,
            request,
            phase: WorkflowPhase::Created,
            plan: Plan::empty(),
            stage_states: HashMap::new(),
            shared_context: HashMap::new(),
            access_log: Vec::new(),
            artifacts_applied: Vec::new(),
            pending_hitl: None,
            hitl_cleared_stages: std::collections::HashSet::new(),
            cursor: WorkflowCursor::default(),
            started_at: Utc::now(),
        }
    }

    /// Whether every stage in the plan has reached a terminal `StageState`.
    #[must_use]
    pub fn all_stages_terminal(&self) -> bool {
        self.plan
            .stages
            .iter()
            .all(|stage| self.stage_states.get(stage.stage_id.0.as_str()).is_some_and(StageState::is_terminal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_transitions_follow_lifecycle() {
        let phase = WorkflowPhase::Created;
        let phase = phase.transition(WorkflowPhase::Planning).unwrap();
        let phase = phase.transition(WorkflowPhase::Running).unwrap();
        let phase = phase.transition(WorkflowPhase::PausedHitl).unwrap();
        let phase = phase.transition(WorkflowPhase::Running).unwrap();
        let phase = phase.transition(WorkflowPhase::Finalizing).unwrap();
        let phase = phase.transition(WorkflowPhase::Completed).unwrap();
        assert!(phase.is_terminal());
    }

    #[test]
    fn cannot_resume_directly_from_paused_user_to_finalizing() {
        let phase = WorkflowPhase::PausedUser;
        assert!(phase.transition(WorkflowPhase::Finalizing).is_err());
    }

    #[test]
    fn terminal_phases_reject_further_transitions() {
        let phase = WorkflowPhase::Completed;
        assert!(phase.transition(WorkflowPhase::Running).is_err());
    }

    #[test]
    fn new_state_has_no_stages_so_all_terminal_vacuously() {
        let session_id = SessionId::from("s1");
        let state = WorkflowState::new(WorkflowId::new(), session_id.clone(), Request::new(session_id, "hi"));
        assert!(state.all_stages_terminal());
    }
}
