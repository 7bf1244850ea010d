//! Agent role handlers driven by the Workflow Engine (C4).
//!
//! Every handler implements [`AgentHandler`] and is registered by role into
//! a [`HandlerRegistry`] the engine consults when scheduling a stage. A
//! handler never talks to the shared-context store, workspace, or HITL
//! broker directly: it yields [`HandlerEvent`]s and lets the engine apply
//! their effects, so every side effect stays observable and serialized
//! through C2/C5/C6.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod error;
mod handler;
mod llm;
mod roles;
mod types;

pub use error::{HandlerError, HandlerResult};
pub use handler::{AgentHandler, HandlerRegistry};
pub use roles::{
    AggregatorHandler, CoderHandler, PlannerHandler, QaGateHandler, RefinerHandler,
    ReviewerHandler, SecurityGateHandler, SupervisorHandler,
};
pub use types::{HandlerEvent, HandlerStream, StageInput};

use std::sync::Arc;

use conclave_llm::EndpointPool;

/// Build a [`HandlerRegistry`] with all eight roles registered, sharing one
/// [`EndpointPool`] across every LLM-backed handler.
#[must_use]
pub fn default_registry(pool: Arc<EndpointPool>) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(SupervisorHandler::new(Arc::clone(&pool))));
    registry.register(Arc::new(PlannerHandler::new(Arc::clone(&pool))));
    registry.register(Arc::new(CoderHandler::new(Arc::clone(&pool))));
    registry.register(Arc::new(ReviewerHandler::new(Arc::clone(&pool))));
    registry.register(Arc::new(QaGateHandler::new()));
    registry.register(Arc::new(SecurityGateHandler::new()));
    registry.register(Arc::new(RefinerHandler::new(Arc::clone(&pool))));
    registry.register(Arc::new(AggregatorHandler::new(pool)));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_core::plan::AgentRole;

    #[test]
    fn default_registry_covers_every_role() {
        let pool = Arc::new(EndpointPool::new(Vec::new(), std::time::Duration::from_secs(30)));
        let registry = default_registry(pool);
        for role in [
            AgentRole::Supervisor,
            AgentRole::Planner,
            AgentRole::Coder,
            AgentRole::Reviewer,
            AgentRole::QaGate,
            AgentRole::SecurityGate,
            AgentRole::Refiner,
            AgentRole::Aggregator,
        ] {
            assert!(registry.get(role).is_some(), "missing handler for {role:?}");
        }
    }
}

