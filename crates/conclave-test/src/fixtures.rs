//! Fixtures for common domain types.

use conclave_core::plan::{AgentRole, Plan, Stage};
use conclave_core::{Request, SessionId, WorkflowId};

/// Create a fresh random session id.
#[must_use]
pub fn test_session_id() -> SessionId {
    SessionId::new()
}

/// Create a fresh random workflow id.
#[must_use]
pub fn test_workflow_id() -> WorkflowId {
    WorkflowId::new()
}

/// Build a request for a brand-new workflow with a default message.
#[must_use]
pub fn test_request() -> Request {
    Request::new(test_session_id(), "add a hello-world endpoint")
}

/// Build a request on a specific session, with a specific message.
#[must_use]
pub fn test_request_for(session_id: SessionId, message: impl Into<String>) -> Request {
    Request::new(session_id, message)
}

/// A minimal single-stage plan: one Coder stage, no dependencies.
#[must_use]
pub fn test_plan_single_coder() -> Plan {
    Plan::new(vec![Stage::new("coder-0", AgentRole::Coder)])
}

/// A Coder stage followed by a Reviewer stage that depends on it, the
/// smallest plan shape exercising the review/refine loop.
#[must_use]
pub fn test_plan_coder_then_reviewer() -> Plan {
    Plan::new(vec![
        Stage::new("coder-0", AgentRole::Coder),
        Stage::new("reviewer-0", AgentRole::Reviewer).depends_on("coder-0"),
    ])
}

/// A fan-out plan: two Coder stages in the same parallel group, aggregated
/// by a single downstream Aggregator stage.
#[must_use]
pub fn test_plan_parallel_coders() -> Plan {
    Plan::new(vec![
        Stage::new("coder-0", AgentRole::Coder).in_parallel_group("fanout"),
        Stage::new("coder-1", AgentRole::Coder).in_parallel_group("fanout"),
        Stage::new("aggregator-0", AgentRole::Aggregator)
            .depends_on("coder-0")
            .depends_on("coder-1"),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_fixture_targets_its_own_workflow() {
        let request = test_request();
        assert_eq!(request.session_id, request.session_id.clone());
        assert!(!request.user_message.is_empty());
    }

    #[test]
    fn coder_then_reviewer_plan_validates() {
        let plan = test_plan_coder_then_reviewer();
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn parallel_coders_plan_validates() {
        let plan = test_plan_parallel_coders();
        assert!(plan.validate().is_ok());
    }
}
