//! The handler contract and the registry mapping roles to implementations.
//!
//! Each handler follows the same stream-LLM-then-act shape, split into
//! eight role-specific implementations that each emit observability/control
//! events and let the caller drive tool and HITL dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use conclave_core::plan::AgentRole;
use tokio_util::sync::CancellationToken;

use crate::types::{HandlerStream, StageInput};

/// A single agent role's execution logic for one stage.
///
/// Handlers do not schedule themselves: `execute` returns a stream and it is
/// the Workflow Engine's job to poll it, apply the events it yields, and
/// answer any embedded suspension requests.
#[async_trait]
pub trait AgentHandler: Send + Sync {
    /// Which role this handler implements.
    fn role(&self) -> AgentRole;

    /// Run one stage invocation. `cancel` is the owning workflow's
    /// cancellation token; handlers that loop (LLM streaming, tool waits)
    /// must race it at each suspension point.
    async fn execute(&self, input: StageInput, cancel: CancellationToken) -> HandlerStream;
}

/// Maps each [`AgentRole`] to the handler implementing it.
///
/// A name-to-implementation map narrowed to the fixed eight-role key space
/// instead of an open catalog.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, Arc<dyn AgentHandler>>,
}

impl HandlerRegistry {
    /// Construct an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { handlers: HashMap::new() }
    }

    /// Register a handler, keyed by its own [`AgentHandler::role`].
    pub fn register(&mut self, handler: Arc<dyn AgentHandler>) {
        self.handlers.insert(handler.role().as_str(), handler);
    }

    /// Look up the handler for `role`.
    #[must_use]
    pub fn get(&self, role: AgentRole) -> Option<Arc<dyn AgentHandler>> {
        self.handlers.get(role.as_str()).cloned()
    }
}

