//! Process-wide state every route handler is given via `axum::State`.

use std::sync::Arc;

use conclave_engine::{Engine, Services};

/// Everything a route handler needs: the engine for workflow lifecycle
/// calls, and a clone of the [`Services`] it was built over for the
/// routes that talk to C1/C2/C9 directly (`/tools/execute`,
/// `/workspace/*`, `/sessions/*`) rather than through a running workflow.
#[derive(Clone)]
pub struct AppState {
    /// The Workflow Engine.
    pub engine: Arc<Engine>,
    /// The same dependency set the engine was constructed from.
    pub services: Services,
}

impl AppState {
    /// Construct state over an already-built engine and its services.
    #[must_use]
    pub fn new(engine: Arc<Engine>, services: Services) -> Self {
        Self { engine, services }
    }
}
