#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! The external HTTP/SSE/WebSocket surface onto the Workflow Engine.
//!
//! A thin `axum` layer: every handler in [`routes`] translates HTTP JSON
//! into a call against [`conclave_engine::Engine`] or the [`Services`] it
//! was built from, and back. No scheduling, retry, or persistence logic
//! lives here — that stays in `conclave-engine`.
//!
//! Routes stay thin and delegate to the runtime: each handler parses the
//! request, calls into `conclave-engine`, and maps the result onto HTTP or
//! a stream, with no orchestration logic of its own.

/// Axum error type translating [`conclave_core::EngineError`] into HTTP
/// responses.
pub mod error;
/// Route handlers, one module per resource.
pub mod routes;
/// Process-wide state shared across every handler.
pub mod state;

pub use error::ApiError;
pub use state::AppState;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the full router over `state`.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
    .route("/workflow/execute", post(routes::workflow::execute))
    .route("/workflow/pause/{workflow_id}", post(routes::workflow::pause))
    .route("/workflow/resume/{workflow_id}", post(routes::workflow::resume))
    .route("/workflow/status/{workflow_id}", get(routes::workflow::status))
    .route("/hitl/pending", get(routes::hitl::pending))
    .route("/hitl/respond/{request_id}", post(routes::hitl::respond))
    .route("/hitl/ws", get(routes::hitl::ws_broadcast))
    .route("/hitl/ws/{workflow_id}", get(routes::hitl::ws_scoped))
    .route("/sessions", get(routes::sessions::list))
    .route("/sessions/{id}", get(routes::sessions::get))
    .route("/sessions/{id}", delete(routes::sessions::remove))
    .route("/tools/execute", post(routes::tools::execute))
    .route("/workspace/files", get(routes::workspace::files))
    .route("/workspace/write", post(routes::workspace::write))
    .route("/workspace/read", get(routes::workspace::read))
    .route("/workspace/set", post(routes::workspace::set))
    .layer(TraceLayer::new_for_http())
    .layer(CorsLayer::permissive())
    .with_state(state)
}

