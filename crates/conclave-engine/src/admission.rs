//! Cross-workflow admission control and per-session mutual exclusion.
//!
//! A process-wide [`tokio::sync::Semaphore`] sized to `max_active_workflows`
//! bounds concurrent *workflows*. Unlike a `try_acquire_owned` fail-fast
//! pool, admission here queues — a submission waits its turn rather than
//! being rejected, with the wait count exposed so the caller can publish a
//! `queued{position}` event before awaiting. A per-session lock keyed by
//! [`SessionId`] enforces "one active workflow per session" without every
//! call site having to remember to check for one itself.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use conclave_core::SessionId;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard, OwnedSemaphorePermit, Semaphore};

/// Held for the lifetime of one admitted workflow run. Dropping it frees the
/// process-wide slot and the per-session lock together, letting the next
/// queued submission for the same session proceed.
pub struct AdmissionGuard {
    _workflow_permit: OwnedSemaphorePermit,
    _session_guard: OwnedMutexGuard<()>,
}

/// Bounds how many workflows run concurrently across the whole process, and
/// serializes workflows belonging to the same session.
pub struct AdmissionController {
    workflow_slots: Arc<Semaphore>,
    waiting: AtomicUsize,
    session_locks: DashMap<SessionId, Arc<Mutex<()>>>,
}

impl AdmissionController {
    /// Construct a controller admitting at most `max_active_workflows` at
    /// once (clamped to at least one, so a misconfigured `0` does not
    /// deadlock every submission forever).
    #[must_use]
    pub fn new(max_active_workflows: usize) -> Self {
        Self {
            workflow_slots: Arc::new(Semaphore::new(max_active_workflows.max(1))),
            waiting: AtomicUsize::new(0),
            session_locks: DashMap::new(),
        }
    }

    /// Number of submissions currently waiting for a process-wide slot,
    /// i.e. the FIFO position a new submission would land at.
    #[must_use]
    pub fn waiting_count(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Admit `session_id`, waiting for both a process-wide workflow slot and
    /// exclusive access to the session. Resolves in the order submissions
    /// arrived (`Semaphore`'s own FIFO wake order).
    pub async fn admit(&self, session_id: &SessionId) -> AdmissionGuard {
        self.waiting.fetch_add(1, Ordering::SeqCst);
        let workflow_permit = Arc::clone(&self.workflow_slots)
        .acquire_owned()
        .await
        .expect("workflow_slots semaphore is never closed");
        self.waiting.fetch_sub(1, Ordering::SeqCst);

        let lock = self
        .session_locks
        .entry(session_id.clone())
        .or_insert_with(|| Arc::new(Mutex::new()))
        .clone();
        let session_guard = lock.lock_owned().await;

        AdmissionGuard { _workflow_permit: workflow_permit, _session_guard: session_guard }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn second_admission_for_same_session_waits_for_the_first_to_drop() {
        let controller = AdmissionController::new(4);
        let session = SessionId::from("s1");

        let first = controller.admit(&session).await;
        let second_fut = controller.admit(&session);
        tokio::pin!(second_fut);

        assert!(tokio::time::timeout(Duration::from_millis(20), &mut second_fut).await.is_err());
        drop(first);
        assert!(tokio::time::timeout(Duration::from_millis(200), second_fut).await.is_ok());
    }

    #[tokio::test]
    async fn different_sessions_do_not_contend() {
        let controller = AdmissionController::new(4);
        let a = controller.admit(&SessionId::from("a")).await;
        let b = controller.admit(&SessionId::from("b")).await;
        drop(a);
        drop(b);
    }

    #[tokio::test]
    async fn exhausting_workflow_slots_queues_regardless_of_session() {
        let controller = AdmissionController::new(1);
        let first = controller.admit(&SessionId::from("a")).await;
        assert_eq!(controller.waiting_count(), 0);
        let second_fut = controller.admit(&SessionId::from("b"));
        tokio::pin!(second_fut);
        assert!(tokio::time::timeout(Duration::from_millis(20), &mut second_fut).await.is_err());
        assert_eq!(controller.waiting_count(), 1);
        drop(first);
        assert!(tokio::time::timeout(Duration::from_millis(200), second_fut).await.is_ok());
    }
}

