//! Pure DAG-readiness helpers over a `Plan` and per-stage state.
//!
//! Kept free of any I/O or async so the scheduling decision itself stays
//! trivially testable; [`crate::workflow::WorkflowRunner`] is the only
//! caller and owns every side effect (spawning, checkpointing, publishing).

use std::collections::{HashMap, HashSet};

use conclave_core::{Stage, StageState};

fn deps_satisfied(stage: &Stage, states: &HashMap<String, StageState>) -> bool {
    let own_state = states.get(stage.stage_id.0.as_str());
    matches!(own_state, Some(StageState::Pending) | None)
        && stage
            .depends_on
            .iter()
            .all(|dep| matches!(states.get(dep.0.as_str()), Some(StageState::Completed | StageState::Skipped)))
}

/// Whether a stage's `requires_hitl` pre-run gate has been resolved (or
/// never applied). Per spec §4.7, a stage is ready only when all
/// dependencies are complete "and its `requires_hitl = false` (or its HITL
/// has been pre-resolved)".
fn hitl_cleared(stage: &Stage, cleared: &HashSet<String>) -> bool {
    !stage.requires_hitl || cleared.contains(stage.stage_id.0.as_str())
}

/// Every stage whose dependencies are all `Completed`/`Skipped`, which is
/// itself still `Pending`, and whose `requires_hitl` gate (if any) is
/// already resolved, in plan order.
#[must_use]
pub fn ready_stages<'a>(
    stages: &'a [Stage],
    states: &HashMap<String, StageState>,
    hitl_cleared_stages: &HashSet<String>,
) -> Vec<&'a Stage> {
    stages
        .iter()
        .filter(|stage| deps_satisfied(stage, states) && hitl_cleared(stage, hitl_cleared_stages))
        .collect()
}

/// Stages whose dependencies are satisfied and are otherwise ready to run,
/// but whose `requires_hitl = true` gate has not yet been resolved. These
/// block at the scheduler rather than running, until a HITL approval
/// clears them (see [`ready_stages`]).
#[must_use]
pub fn awaiting_hitl_gate<'a>(
    stages: &'a [Stage],
    states: &HashMap<String, StageState>,
    hitl_cleared_stages: &HashSet<String>,
) -> Vec<&'a Stage> {
    stages
        .iter()
        .filter(|stage| deps_satisfied(stage, states) && !hitl_cleared(stage, hitl_cleared_stages))
        .collect()
}

/// Whether every stage in the plan has reached a terminal state.
#[must_use]
pub fn all_terminal(stages: &[Stage], states: &HashMap<String, StageState>) -> bool {
    stages.iter().all(|s| states.get(s.stage_id.0.as_str()).is_some_and(StageState::is_terminal))
}

/// Stage ids depending, directly or transitively, on `failed_id` — these can
/// never become ready and are marked `Skipped` rather than left `Pending`
/// forever.
#[must_use]
pub fn downstream_of(stages: &[Stage], failed_id: &str) -> Vec<String> {
    let mut blocked: Vec<String> = vec![failed_id.to_owned()];
    let mut changed = true;
    while changed {
        changed = false;
        for stage in stages {
            let id = stage.stage_id.0.as_str();
            if blocked.iter().any(|b| b == id) {
                continue;
            }
            if stage.depends_on.iter().any(|d| blocked.iter().any(|b| b == d.0.as_str())) {
                blocked.push(id.to_owned());
                changed = true;
            }
        }
    }
    blocked.retain(|id| id != failed_id);
    blocked
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_core::plan::AgentRole;

    fn states(pairs: &[(&str, StageState)]) -> HashMap<String, StageState> {
        pairs.iter().map(|(k, v)| ((*k).to_owned(), *v)).collect()
    }

    #[test]
    fn a_stage_with_no_deps_is_ready_immediately() {
        let stages = vec![Stage::new("supervisor-0", AgentRole::Supervisor)];
        let ready = ready_stages(&stages, &HashMap::new(), &HashSet::new());
        assert_eq!(ready.len(), 1);
    }

    #[test]
    fn a_stage_waits_for_its_dependency_to_complete() {
        let stages = vec![
            Stage::new("coder-0", AgentRole::Coder),
            Stage::new("reviewer-0", AgentRole::Reviewer).depends_on("coder-0"),
        ];
        let pending = ready_stages(&stages, &states(&[("coder-0", StageState::Running)]), &HashSet::new());
        assert!(pending.is_empty());

        let ready = ready_stages(&stages, &states(&[("coder-0", StageState::Completed)]), &HashSet::new());
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].stage_id.0, "reviewer-0");
    }

    #[test]
    fn a_stage_requiring_hitl_is_not_ready_until_cleared() {
        let mut gated = Stage::new("coder-0", AgentRole::Coder);
        gated.requires_hitl = true;
        let stages = vec![gated];

        let not_ready = ready_stages(&stages, &HashMap::new(), &HashSet::new());
        assert!(not_ready.is_empty());

        let gate_candidates = awaiting_hitl_gate(&stages, &HashMap::new(), &HashSet::new());
        assert_eq!(gate_candidates.len(), 1);
        assert_eq!(gate_candidates[0].stage_id.0, "coder-0");

        let cleared: HashSet<String> = ["coder-0".to_owned()].into_iter().collect();
        let ready = ready_stages(&stages, &HashMap::new(), &cleared);
        assert_eq!(ready.len(), 1);
        assert!(awaiting_hitl_gate(&stages, &HashMap::new(), &cleared).is_empty());
    }

    #[test]
    fn downstream_of_a_failure_includes_transitive_dependents() {
        let stages = vec![
            Stage::new("coder-0", AgentRole::Coder),
            Stage::new("reviewer-0", AgentRole::Reviewer).depends_on("coder-0"),
            Stage::new("aggregator-0", AgentRole::Aggregator).depends_on("reviewer-0"),
        ];
        let mut blocked = downstream_of(&stages, "coder-0");
        blocked.sort();
        assert_eq!(blocked, vec!["aggregator-0".to_owned(), "reviewer-0".to_owned()]);
    }

    #[test]
    fn all_terminal_is_vacuously_true_for_an_empty_plan() {
        assert!(all_terminal(&[], &HashMap::new()));
    }

    #[test]
    fn requires_hitl_false_is_unaffected_by_an_empty_cleared_set() {
        let stages = vec![Stage::new("coder-0", AgentRole::Coder)];
        assert_eq!(ready_stages(&stages, &HashMap::new(), &HashSet::new()).len(), 1);
        assert!(awaiting_hitl_gate(&stages, &HashMap::new(), &HashSet::new()).is_empty());
    }
}
