//! The HITL request/response broker.
//!
//! Implements a request lifecycle (register → present → wait → resolve) as
//! a pure state machine: this
//! broker does not present requests itself, it only tracks them and wakes
//! waiting stages. Presentation is the server's job (`conclave-server`
//! turns `HitlRequested` events into an HTTP/WS surface). Lifecycle
//! notification reuses the already-built Event Bus (C8) rather than a
//! second broadcast mechanism.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use conclave_core::hitl::HitlRequestState;
use conclave_core::{EngineError, EngineResult, EventKind, HitlRequest, HitlResponse, RequestId, WorkflowId};
use conclave_events::EventBus;
use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

struct PendingEntry {
    request: HitlRequest,
    state: HitlRequestState,
    responder: Option<oneshot::Sender<HitlResponse>>,
}

/// Outcome of waiting on a registered HITL request.
#[derive(Debug)]
pub enum HitlOutcome {
    /// A human responded.
    Resolved(HitlResponse),
    /// The workflow was cancelled while the request was outstanding.
    Cancelled,
    /// The request's deadline elapsed with no response.
    Expired,
}

/// A single-shot wait handle returned by [`HitlBroker::register`].
pub struct HitlWaiter {
    broker: HitlBroker,
    request_id: RequestId,
    receiver: oneshot::Receiver<HitlResponse>,
    deadline: Option<Duration>,
    cancel: CancellationToken,
}

impl HitlWaiter {
    /// Block until the request is resolved, cancelled, or expires.
    pub async fn wait(mut self) -> HitlOutcome {
        if let Some(deadline) = self.deadline {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    self.broker.mark_cancelled(self.request_id, "workflow cancelled");
                    HitlOutcome::Cancelled
                }
                () = tokio::time::sleep(deadline) => {
                    self.broker.mark_expired(self.request_id);
                    HitlOutcome::Expired
                }
                result = &mut self.receiver => result.map_or(HitlOutcome::Cancelled, HitlOutcome::Resolved),
            }
        } else {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    self.broker.mark_cancelled(self.request_id, "workflow cancelled");
                    HitlOutcome::Cancelled
                }
                result = &mut self.receiver => result.map_or(HitlOutcome::Cancelled, HitlOutcome::Resolved),
            }
        }
    }
}

/// Tracks outstanding HITL requests and wakes the stage waiting on each one.
///
/// Cheap to clone: an `Arc`-shared `DashMap`, matching `EventBus`'s
/// clone-to-share pattern.
#[derive(Clone)]
pub struct HitlBroker {
    pending: Arc<DashMap<RequestId, PendingEntry>>,
    bus: EventBus,
}

impl HitlBroker {
    /// Build a broker that publishes lifecycle events onto `bus`.
    #[must_use]
    pub fn new(bus: EventBus) -> Self {
        Self { pending: Arc::new(DashMap::new()), bus }
    }

    /// Register a new request and return a waiter for it. `cancel` should be
    /// the owning workflow's cancellation token.
    pub fn register(&self, request: HitlRequest, cancel: CancellationToken) -> HitlWaiter {
        let request_id = request.request_id;
        let workflow_id = request.workflow_id;
        let stage_id = request.stage_id.clone();
        let checkpoint_type = request.checkpoint_type;
        let title = request.title.clone();
        let deadline = request.deadline.map(|at| (at - Utc::now()).to_std().unwrap_or(Duration::ZERO));

        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id, PendingEntry { request, state: HitlRequestState::Pending, responder: Some(tx) });

        self.bus.publish(workflow_id, EventKind::HitlRequested { request_id, stage_id, checkpoint_type, title });
        debug!(%request_id, "hitl request registered");

        HitlWaiter { broker: self.clone(), request_id, receiver: rx, deadline, cancel }
    }

    /// Resolve a pending request with a human's response.
    pub fn resolve(&self, request_id: RequestId, response: HitlResponse) -> EngineResult<()> {
        let Some(mut entry) = self.pending.get_mut(&request_id) else {
            return Err(EngineError::HitlNotPending(request_id));
        };
        if !entry.state.is_pending() {
            return Err(EngineError::HitlNotPending(request_id));
        }
        let workflow_id = entry.request.workflow_id;
        let action = response.action;
        entry.state = HitlRequestState::Resolved;
        if let Some(responder) = entry.responder.take() {
            let _ = responder.send(response);
        }
        drop(entry);
        self.bus.publish(workflow_id, EventKind::HitlResolved { request_id, action });
        Ok(())
    }

    /// Cancel a pending request, e.g. because its owning workflow was
    /// cancelled by the caller rather than detected via the waiter's own
    /// cancellation token.
    pub fn cancel(&self, request_id: RequestId, reason: &str) -> EngineResult<()> {
        let Some(mut entry) = self.pending.get_mut(&request_id) else {
            return Err(EngineError::HitlNotPending(request_id));
        };
        if !entry.state.is_pending() {
            return Err(EngineError::HitlNotPending(request_id));
        }
        entry.state = HitlRequestState::Cancelled;
        entry.responder = None;
        let workflow_id = entry.request.workflow_id;
        drop(entry);
        self.bus.publish(workflow_id, EventKind::HitlCancelled { request_id, reason: reason.to_owned() });
        Ok(())
    }

    /// List every currently pending request, optionally scoped to one
    /// workflow, highest `priority` first.
    #[must_use]
    pub fn list_pending(&self, workflow_id: Option<WorkflowId>) -> Vec<HitlRequest> {
        let mut out: Vec<HitlRequest> = self
            .pending
            .iter()
            .filter(|e| e.state.is_pending())
            .filter(|e| workflow_id.is_none_or(|w| w == e.request.workflow_id))
            .map(|e| e.request.clone())
            .collect();
        out.sort_by(|a, b| b.priority.cmp(&a.priority));
        out
    }

    /// Sweep every pending request past its deadline, transitioning each to
    /// `expired`. Intended to be called periodically by the engine and on
    /// checkpoint resume, to cover requests whose waiter is not (or no
    /// longer) running in this process.
    pub fn sweep_expired(&self) -> Vec<RequestId> {
        let now = Utc::now();
        let mut expired = Vec::new();
        for mut entry in self.pending.iter_mut() {
            if !entry.state.is_pending() {
                continue;
            }
            if entry.request.deadline.is_some_and(|d| d <= now) {
                entry.state = HitlRequestState::Expired;
                entry.responder = None;
                expired.push(entry.request.request_id);
            }
        }
        for request_id in &expired {
            if let Some(entry) = self.pending.get(request_id) {
                self.bus.publish(entry.request.workflow_id, EventKind::HitlExpired { request_id: *request_id });
            }
        }
        expired
    }

    fn mark_expired(&self, request_id: RequestId) {
        if let Some(mut entry) = self.pending.get_mut(&request_id) {
            if entry.state.is_pending() {
                entry.state = HitlRequestState::Expired;
                entry.responder = None;
                let workflow_id = entry.request.workflow_id;
                drop(entry);
                self.bus.publish(workflow_id, EventKind::HitlExpired { request_id });
            }
        }
    }

    fn mark_cancelled(&self, request_id: RequestId, reason: &str) {
        if self.cancel(request_id, reason).is_err() {
            warn!(%request_id, "mark_cancelled on a request that was already resolved");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_core::{CheckpointType, HitlResponseAction, StageId};

    fn sample_request(workflow_id: WorkflowId) -> HitlRequest {
        HitlRequest::new(workflow_id, StageId::from("coder-0"), CheckpointType::Approval, "Apply changes?", "diff preview")
    }

    #[tokio::test]
    async fn resolve_wakes_the_waiter() {
        let broker = HitlBroker::new(EventBus::new());
        let workflow_id = WorkflowId::new();
        let request = sample_request(workflow_id);
        let request_id = request.request_id;
        let waiter = broker.register(request, CancellationToken::new());

        broker.resolve(request_id, HitlResponse::new(request_id, HitlResponseAction::Approve)).unwrap();

        match waiter.wait().await {
            HitlOutcome::Resolved(response) => assert_eq!(response.action, HitlResponseAction::Approve),
            other => panic!("expected Resolved, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancelling_the_workflow_token_wakes_the_waiter_as_cancelled() {
        let broker = HitlBroker::new(EventBus::new());
        let workflow_id = WorkflowId::new();
        let request = sample_request(workflow_id);
        let cancel = CancellationToken::new();
        let waiter = broker.register(request, cancel.clone());

        cancel.cancel();
        assert!(matches!(waiter.wait().await, HitlOutcome::Cancelled));
    }

    #[tokio::test]
    async fn resolving_a_non_pending_request_errors() {
        let broker = HitlBroker::new(EventBus::new());
        let workflow_id = WorkflowId::new();
        let request = sample_request(workflow_id);
        let request_id = request.request_id;
        let _waiter = broker.register(request, CancellationToken::new());

        broker.resolve(request_id, HitlResponse::new(request_id, HitlResponseAction::Approve)).unwrap();
        let second = broker.resolve(request_id, HitlResponse::new(request_id, HitlResponseAction::Reject));
        assert!(matches!(second, Err(EngineError::HitlNotPending(_))));
    }

    #[tokio::test]
    async fn list_pending_filters_by_workflow_and_sorts_by_priority() {
        let broker = HitlBroker::new(EventBus::new());
        let workflow_a = WorkflowId::new();
        let workflow_b = WorkflowId::new();
        let mut low = sample_request(workflow_a);
        low.priority = 1;
        let mut high = sample_request(workflow_a);
        high.priority = 5;
        let other = sample_request(workflow_b);

        let _w1 = broker.register(low, CancellationToken::new());
        let _w2 = broker.register(high, CancellationToken::new());
        let _w3 = broker.register(other, CancellationToken::new());

        let pending = broker.list_pending(Some(workflow_a));
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].priority, 5);
    }
}
