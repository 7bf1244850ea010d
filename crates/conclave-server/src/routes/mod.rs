//! One module per resource, each a thin translation layer onto the engine.

/// `/hitl/*` — pending requests, responses, and WebSocket lifecycle push.
pub mod hitl;
/// `/sessions/*` — conversation store projections.
pub mod sessions;
/// `/tools/execute` — direct tool invocation outside a workflow.
pub mod tools;
/// `/workflow/*` — submission, control, and status.
pub mod workflow;
/// `/workspace/*` — direct workspace file access outside a workflow.
pub mod workspace;
