//! Plan/Stage data model: the DAG the Supervisor produces and the engine schedules.

use crate::ids::StageId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Which agent role a stage invokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Decomposes the request into a plan.
    Supervisor,
    /// Expands abstract stages into concrete file-level steps.
    Planner,
    /// Produces file artifacts.
    Coder,
    /// Reviews candidate artifacts.
    Reviewer,
    /// Runs tests.
    QaGate,
    /// Scans artifacts for security findings.
    SecurityGate,
    /// Produces updated artifacts from prior output plus gate findings.
    Refiner,
    /// Assembles the final user-facing response.
    Aggregator,
}

impl AgentRole {
    /// Short identifier used in stage ids and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Supervisor => "supervisor",
            Self::Planner => "planner",
            Self::Coder => "coder",
            Self::Reviewer => "reviewer",
            Self::QaGate => "qa-gate",
            Self::SecurityGate => "security-gate",
            Self::Refiner => "refiner",
            Self::Aggregator => "aggregator",
        }
    }
}

/// A tag grouping stages that may run concurrently.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParallelGroup(pub String);

/// Retry policy for a single stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum retries for transient failures (default 1).
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 1 }
    }
}

/// One invocation of an agent handler with defined inputs and a position in the plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    /// Unique id within the plan.
    pub stage_id: StageId,
    /// Which agent role this stage invokes.
    pub agent_role: AgentRole,
    /// Keys into shared context this stage depends on.
    pub inputs_refs: Vec<String>,
    /// Stage ids that must complete before this one becomes ready.
    pub depends_on: Vec<StageId>,
    /// Whether this stage must be preceded by a resolved HITL checkpoint.
    pub requires_hitl: bool,
    /// Retry policy for transient failures.
    pub retry_policy: RetryPolicy,
    /// Per-stage timeout (default 120s).
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    /// Optional parallel-group tag.
    pub parallel_group: Option<ParallelGroup>,
}

impl Stage {
    /// Construct a stage with the default policy (no HITL, 1 retry, 120s timeout).
    #[must_use]
    pub fn new(stage_id: impl Into<StageId>, agent_role: AgentRole) -> Self {
        Self {
            stage_id: stage_id.into(),
            agent_role,
            inputs_refs: Vec::new(),
            depends_on: Vec::new(),
            requires_hitl: false,
            retry_policy: RetryPolicy::default(),
            timeout: Duration::from_secs(120),
            parallel_group: None,
        }
    }

    /// Builder: add a dependency edge.
    #[must_use]
    pub fn depends_on(mut self, stage_id: impl Into<StageId>) -> Self {
        self.depends_on.push(stage_id.into());
        self
    }

    /// Builder: add an input-ref key.
    #[must_use]
    pub fn with_input(mut self, key: impl Into<String>) -> Self {
        self.inputs_refs.push(key.into());
        self
    }

    /// Builder: assign a parallel group.
    #[must_use]
    pub fn in_parallel_group(mut self, group: impl Into<String>) -> Self {
        self.parallel_group = Some(ParallelGroup(group.into()));
        self
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

/// An ordered list of stages with explicit dependency edges forming a DAG.
///
/// Produced once by the Supervisor; may be revised at most `revision_limit`
/// times (default 1) if a stage fails permanently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Stages forming the DAG.
    pub stages: Vec<Stage>,
    /// Number of times this plan has already been revised.
    pub revision: u32,
    /// Maximum number of revisions allowed (default 1).
    pub revision_limit: u32,
}

impl Plan {
    /// Construct an empty plan (the `quick_qa` case: zero stages).
    #[must_use]
    pub fn empty() -> Self {
        Self {
            stages: Vec::new(),
            revision: 0,
            revision_limit: 1,
        }
    }

    /// Construct a plan from a stage list with the default revision limit.
    #[must_use]
    pub fn new(stages: Vec<Stage>) -> Self {
        Self {
            stages,
            revision: 0,
            revision_limit: 1,
        }
    }

    /// Whether a further revision is permitted.
    #[must_use]
    pub fn can_revise(&self) -> bool {
        self.revision < self.revision_limit
    }

    /// Look up a stage by id.
    #[must_use]
    pub fn stage(&self, id: &StageId) -> Option<&Stage> {
        self.stages.iter().find(|s| &s.stage_id == id)
    }

    /// Validate the plan forms a DAG (no cycles, no dangling dependency ids).
    ///
    /// Returns the offending stage id on failure.
    pub fn validate(&self) -> Result<(), StageId> {
        let known: BTreeSet<&StageId> = self.stages.iter().map(|s| &s.stage_id).collect();
        for stage in &self.stages {
            for dep in &stage.depends_on {
                if !known.contains(dep) {
                    return Err(stage.stage_id.clone());
                }
            }
        }
        // Cycle check via iterative topological peel.
        let mut remaining: Vec<&Stage> = self.stages.iter().collect();
        let mut done: BTreeSet<&StageId> = BTreeSet::new();
        while !remaining.is_empty() {
            let before = remaining.len();
            remaining.retain(|s| {
                let ready = s.depends_on.iter().all(|d| done.contains(d));
                if ready {
                    done.insert(&s.stage_id);
                }
                !ready
            });
            if remaining.len() == before {
                // No progress: a cycle exists among `remaining`.
                return Err(remaining[0].stage_id.clone());
            }
        }
        Ok(())
    }
}

/// Lifecycle of a single stage. Transitions are monotone except that
/// `AwaitingHitl` may resume to `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    /// Not yet eligible to run (dependencies incomplete).
    Pending,
    /// All dependencies are complete; eligible for scheduling.
    Ready,
    /// Currently executing.
    Running,
    /// Suspended on a HITL request.
    AwaitingHitl,
    /// Finished successfully.
    Completed,
    /// Finished with a permanent failure.
    Failed,
    /// Never ran (e.g. its dependency chain failed first).
    Skipped,
    /// Cancelled by workflow cancellation.
    Cancelled,
}

impl StageState {
    /// Whether this state is terminal (no further transitions possible).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Skipped | Self::Cancelled
        )
    }

    /// Attempt a transition, enforcing the monotone-except-HITL-resume rule.
    ///
    /// # Errors
    ///
    /// Returns `self` unchanged (as `Err`) if the transition is not permitted.
    pub fn transition(self, to: Self) -> Result<Self, Self> {
        let allowed = matches!(
            (self, to),
            (Self::Pending, Self::Ready)
                | (Self::Ready, Self::Running)
                | (Self::Running, Self::AwaitingHitl)
                | (Self::AwaitingHitl, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Pending | Self::Ready, Self::Skipped)
                | (_, Self::Cancelled)
        ) && !self.is_terminal();
        if allowed || (self == Self::Cancelled && to == Self::Cancelled) {
            Ok(to)
        } else {
            Err(self)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_validate_rejects_dangling_dependency() {
        let plan = Plan::new(vec![
            Stage::new("coder-0", AgentRole::Coder).depends_on("missing"),
        ]);
        assert!(plan.validate().is_err());
    }

    #[test]
    fn plan_validate_rejects_cycle() {
        let plan = Plan::new(vec![
            Stage::new("a", AgentRole::Coder).depends_on("b"),
            Stage::new("b", AgentRole::Reviewer).depends_on("a"),
        ]);
        assert!(plan.validate().is_err());
    }

    #[test]
    fn plan_validate_accepts_linear_chain() {
        let plan = Plan::new(vec![
            Stage::new("supervisor-0", AgentRole::Supervisor),
            Stage::new("coder-0", AgentRole::Coder).depends_on("supervisor-0"),
            Stage::new("reviewer-0", AgentRole::Reviewer).depends_on("coder-0"),
        ]);
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn stage_state_awaiting_hitl_can_resume_to_running() {
        assert_eq!(
            StageState::AwaitingHitl.transition(StageState::Running),
            Ok(StageState::Running)
        );
    }

    #[test]
    fn stage_state_terminal_states_reject_further_transitions() {
        assert!(
            StageState::Completed
                .transition(StageState::Running)
                .is_err()
        );
        assert!(
            StageState::Failed
                .transition(StageState::Completed)
                .is_err()
        );
    }

    #[test]
    fn stage_state_cannot_skip_backwards_from_running() {
        assert!(StageState::Running.transition(StageState::Pending).is_err());
    }
}
