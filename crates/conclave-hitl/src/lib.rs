//! HITL Broker (C6): tracks outstanding human-in-the-loop requests and
//! wakes the stage waiting on each one.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod broker;

pub use broker::{HitlBroker, HitlOutcome, HitlWaiter};
