//! Conclave Core - Foundation types for the agent-orchestration runtime.
//!
//! This crate provides:
//! - Identifiers shared across every other crate (`SessionId`, `WorkflowId`, `StageId`)
//! - The request/plan/stage data model a workflow run is built from
//! - Agent output and artifact types
//! - The shared-context entry type
//! - The event taxonomy streamed to subscribers
//! - HITL request/response types
//! - The error taxonomy

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod agent_output;
pub mod artifact;
pub mod context_entry;
pub mod error;
pub mod event;
pub mod hitl;
pub mod ids;
pub mod plan;
pub mod request;
pub mod workflow_state;

pub use agent_output::AgentOutput;
pub use artifact::{Artifact, ArtifactAction};
pub use context_entry::{AccessLogEntry, ContextAccess, ContextEntry};
pub use error::{EngineError, EngineResult};
pub use event::{Event, EventKind};
pub use hitl::{CheckpointType, HitlRequest, HitlResponse, HitlResponseAction};
pub use ids::{RequestId, SessionId, StageId, WorkflowId};
pub use plan::{ParallelGroup, Plan, RetryPolicy, Stage, StageState};
pub use request::Request;
pub use workflow_state::{WorkflowPhase, WorkflowState};
