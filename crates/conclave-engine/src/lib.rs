//! Workflow Engine (C7): the apex component driving a `Plan` from
//! `created` to a terminal phase.
//!
//! Uses a semaphore-bounded task pool — the same permit-then-spawn-then-release
//! shape — applied at three nested scopes: cross-workflow admission,
//! per-workflow stage concurrency, and per-session mutual exclusion.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod admission;
mod engine;
mod scheduler;
mod workflow;

pub use admission::AdmissionController;
pub use engine::{Engine, Services, WorkflowHandle, WorkflowSnapshot};
pub use workflow::WorkflowRunner;
