//! The Event Bus: per-workflow multicast with per-subscriber bounded buffers.
//!
//! Rather than a single `tokio::sync::broadcast` channel that silently drops
//! the slowest subscriber's backlog on overflow, this bus gives every
//! subscriber its own bounded `mpsc` channel and counts drops explicitly.
//! When a subscriber's
//! buffer is full, the bus records the drop instead of blocking the
//! publisher; the next event delivered to that subscriber is preceded by a
//! [`EventKind::Dropped`] marker carrying the count, so a consumer (the SSE
//! or WebSocket handler in `conclave-server`) knows to fetch a fresh
//! [`EventKind::Snapshot`] from the checkpoint store before trusting the
//! stream again.

use conclave_core::{Event, EventKind, WorkflowId};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Default per-subscriber channel capacity.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

struct Subscriber {
    sender: mpsc::Sender<Event>,
    dropped: AtomicU64,
}

/// Multicasts [`Event`]s to per-workflow subscribers.
///
/// Cheap to clone: internally an `Arc` over a `DashMap` sharing the
/// subscriber registry across clones instead of a single broadcast sender.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<DashMap<WorkflowId, Vec<Subscriber>>>,
    capacity: usize,
    next_seq: Arc<DashMap<WorkflowId, u64>>,
}

impl EventBus {
    /// Construct a bus with the default per-subscriber capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SUBSCRIBER_CAPACITY)
    }

    /// Construct a bus with an explicit per-subscriber channel capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscribers: Arc::new(DashMap::new()),
            capacity,
            next_seq: Arc::new(DashMap::new()),
        }
    }

    /// Subscribe to all events published for `workflow_id`.
    #[must_use]
    pub fn subscribe(&self, workflow_id: WorkflowId) -> EventReceiver {
        let (sender, receiver) = mpsc::channel(self.capacity);
        self.subscribers
            .entry(workflow_id)
            .or_default()
            .push(Subscriber {
                sender,
                dropped: AtomicU64::new(0),
            });
        debug!(%workflow_id, "subscriber registered");
        EventReceiver { receiver }
    }

    /// Publish an event kind for `workflow_id`, stamping the next monotonic
    /// sequence number for that workflow.
    ///
    /// Returns the number of subscribers the event was (eventually, possibly
    /// after a dropped-marker) delivered to.
    pub fn publish(&self, workflow_id: WorkflowId, kind: EventKind) -> usize {
        let seq = {
            let mut entry = self.next_seq.entry(workflow_id).or_insert(0);
            let seq = *entry;
            *entry = seq.saturating_add(1);
            seq
        };
        let event = Event::new(workflow_id, seq, kind);
        self.publish_event(event)
    }

    /// Publish a fully constructed event as-is (used for `Snapshot`/`Dropped`
    /// markers the caller wants to stamp at a specific sequence number).
    pub fn publish_event(&self, event: Event) -> usize {
        let Some(mut subs) = self.subscribers.get_mut(&event.workflow_id) else {
            trace!(workflow_id = %event.workflow_id, "no subscribers for event");
            return 0;
        };
        let mut delivered = 0;
        for sub in subs.iter_mut() {
            if deliver(sub, &event) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Current value of the next sequence number that will be assigned for
    /// `workflow_id`, so a checkpoint can record where to seed a future
    /// resume's counter back to.
    #[must_use]
    pub fn peek_next_seq(&self, workflow_id: WorkflowId) -> u64 {
        self.next_seq.get(&workflow_id).map_or(0, |v| *v)
    }

    /// Seed the next sequence number for `workflow_id`, e.g. after resuming
    /// a workflow from a checkpoint so freshly published events continue
    /// the same sequence a reconnecting subscriber already saw rather than
    /// restarting at zero.
    pub fn seed_seq(&self, workflow_id: WorkflowId, next_seq: u64) {
        self.next_seq.insert(workflow_id, next_seq);
    }

    /// Remove all subscribers for a workflow, e.g. once it reaches a
    /// terminal phase and no further events will be published.
    pub fn close(&self, workflow_id: WorkflowId) {
        self.subscribers.remove(&workflow_id);
        self.next_seq.remove(&workflow_id);
    }

    /// Current subscriber count for a workflow.
    #[must_use]
    pub fn subscriber_count(&self, workflow_id: WorkflowId) -> usize {
        self.subscribers
            .get(&workflow_id)
            .map_or(0, |s| s.len())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Attempt delivery to one subscriber, flushing a pending `Dropped` marker
/// first if the subscriber has lost events since its last successful send.
fn deliver(sub: &mut Subscriber, event: &Event) -> bool {
    let pending = sub.dropped.load(Ordering::Relaxed);
    if pending > 0 {
        let marker = Event::new(event.workflow_id, event.monotonic_seq, EventKind::Dropped { count: pending });
        if sub.sender.try_send(marker).is_ok() {
            sub.dropped.store(0, Ordering::Relaxed);
        } else {
            sub.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
    }
    match sub.sender.try_send(event.clone()) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            sub.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(workflow_id = %event.workflow_id, "subscriber buffer full, event dropped");
            false
        },
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

/// A subscription handle returned by [`EventBus::subscribe`].
pub struct EventReceiver {
    receiver: mpsc::Receiver<Event>,
}

impl EventReceiver {
    /// Await the next event.
    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive_in_order() {
        let bus = EventBus::new();
        let workflow_id = WorkflowId::new();
        let mut rx = bus.subscribe(workflow_id);

        bus.publish(workflow_id, EventKind::Heartbeat);
        bus.publish(workflow_id, EventKind::WorkflowCancelled);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.monotonic_seq, 0);
        assert_eq!(second.monotonic_seq, 1);
        assert_eq!(second.event_type(), "workflow_cancelled");
    }

    #[tokio::test]
    async fn no_subscribers_is_a_noop() {
        let bus = EventBus::new();
        let count = bus.publish(WorkflowId::new(), EventKind::Heartbeat);
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn overflow_is_recorded_and_surfaced_as_dropped_marker() {
        let bus = EventBus::with_capacity(1);
        let workflow_id = WorkflowId::new();
        let mut rx = bus.subscribe(workflow_id);

        // Fill the one-slot buffer, then overflow it twice without draining.
        bus.publish(workflow_id, EventKind::Heartbeat);
        bus.publish(workflow_id, EventKind::Heartbeat);
        bus.publish(workflow_id, EventKind::Heartbeat);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.event_type(), "heartbeat");

        bus.publish(workflow_id, EventKind::WorkflowCancelled);
        let marker = rx.recv().await.unwrap();
        assert!(matches!(marker.kind, EventKind::Dropped { count } if count >= 1));
    }

    #[tokio::test]
    async fn seeded_seq_continues_from_the_given_value() {
        let bus = EventBus::new();
        let workflow_id = WorkflowId::new();
        let mut rx = bus.subscribe(workflow_id);
        bus.seed_seq(workflow_id, 42);
        bus.publish(workflow_id, EventKind::Heartbeat);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.monotonic_seq, 42);
    }

    #[tokio::test]
    async fn closing_a_workflow_drops_its_subscribers() {
        let bus = EventBus::new();
        let workflow_id = WorkflowId::new();
        let _rx = bus.subscribe(workflow_id);
        assert_eq!(bus.subscriber_count(workflow_id), 1);
        bus.close(workflow_id);
        assert_eq!(bus.subscriber_count(workflow_id), 0);
    }
}
