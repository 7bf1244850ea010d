#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Shared Context Store (C5): an append-only, size-capped blackboard that
//! every stage in a workflow reads from and writes to.

pub mod store;

pub use store::SharedContext;
