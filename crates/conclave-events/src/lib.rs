#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Event Bus (C8): streams typed [`Event`](conclave_core::Event)s produced by
//! a running workflow to any number of subscribers, with an explicit
//! drop-and-resync contract instead of silent broadcast-channel lag.

pub mod bus;

pub use bus::{EventBus, EventReceiver, DEFAULT_SUBSCRIBER_CAPACITY};
