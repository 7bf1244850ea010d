//! Session & Workflow Store (C9).
//!
//! Two concerns, kept strictly separate — the conversation store never
//! drives resume:
//! - [`ConversationStore`]: durable, append-only per-session messages,
//! artifact metadata, and workflow summaries.
//! - [`WorkflowCheckpointStore`]: transactional `WorkflowState` persistence,
//! the sole input to resume.
//!
//! Both ship an in-memory variant (tests, `conclave-test` fixtures) and a
//! file-backed variant. The `surreal` feature adds an embedded-`SurrealDB`
//! checkpoint tier alongside the file-backed one, following the same
//! two-tier KV/DB design.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod checkpoint;
mod conversation;
#[cfg(feature = "surreal")]
mod surreal;

pub use checkpoint::{FileCheckpointStore, InMemoryCheckpointStore, WorkflowCheckpointStore};
pub use conversation::{
    digest_hex, list_summaries, ArtifactRecord, ConversationMessage, ConversationRecord,
    ConversationStore, FileConversationStore, InMemoryConversationStore, SessionSummary,
    WorkflowSummary,
};
#[cfg(feature = "surreal")]
pub use surreal::SurrealCheckpointStore;

