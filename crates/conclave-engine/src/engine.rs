//! The Workflow Engine's public API: submission, pause/resume/
//! cancel, and status queries over [`WorkflowRunner`] instances.

use std::collections::HashMap;
use std::sync::Arc;

use conclave_agents::HandlerRegistry;
use conclave_config::Config;
use conclave_core::{
    EngineError, EngineResult, EventKind, HitlRequest, HitlResponse, Plan, RequestId, SessionId,
    StageState, WorkflowCursor, WorkflowId, WorkflowPhase, WorkflowState,
};
use conclave_events::{EventBus, EventReceiver};
use conclave_hitl::HitlBroker;
use conclave_storage::{ConversationStore, WorkflowCheckpointStore};
use conclave_tools::ToolRegistry;
use conclave_workspace::WorkspaceManager;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::admission::AdmissionController;
use crate::workflow::{PauseControl, WorkflowRunner};

/// Every injected dependency the Workflow Engine drives stages through.
#[derive(Clone)]
pub struct Services {
    /// Role-to-handler map consulted when scheduling a stage.
    pub handlers: HandlerRegistry,
    /// The tool catalog, shared read-only across every stage invocation.
    pub tools: Arc<ToolRegistry>,
    /// Per-session workspace resolution and artifact application.
    pub workspace: Arc<WorkspaceManager>,
    /// Multicasts workflow lifecycle events to subscribers.
    pub events: EventBus,
    /// Tracks outstanding human-in-the-loop requests.
    pub hitl: HitlBroker,
    /// Transactional `WorkflowState` persistence, the input to resume.
    pub checkpoints: Arc<dyn WorkflowCheckpointStore>,
    /// Durable per-session messages, artifacts, and workflow summaries.
    pub conversations: Arc<dyn ConversationStore>,
    /// Engine-relevant configuration (admission limits, retry/timeout
    /// defaults, shared-context caps).
    pub config: Config,
}

/// A live handle to a submitted or resumed workflow run, returned to the
/// caller (`conclave-server`) so it can pause/resume/cancel it without a
/// separate lookup.
#[derive(Clone)]
pub struct WorkflowHandle {
    /// The workflow this handle controls.
    pub workflow_id: WorkflowId,
    /// The owning session.
    pub session_id: SessionId,
    cancel: CancellationToken,
    pause: Arc<PauseControl>,
}

impl WorkflowHandle {
    /// Cancel the workflow. Propagates into every running stage and
    /// resolves any outstanding HITL wait as cancelled.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Request a cooperative pause at the next stage boundary.
    pub fn request_pause(&self) {
        self.pause.request_pause();
    }

    /// Lift a pause requested on this handle.
    pub fn unpause(&self) {
        self.pause.resume();
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// A point-in-time projection of a workflow's durable state, for status
/// queries (`conclave-server`'s `/workflow/status`).
#[derive(Debug, Clone, serde::Serialize)]
pub struct WorkflowSnapshot {
    /// The workflow this snapshot describes.
    pub workflow_id: WorkflowId,
    /// The owning session.
    pub session_id: SessionId,
    /// Current lifecycle phase.
    pub phase: WorkflowPhase,
    /// The current plan.
    pub plan: Plan,
    /// Per-stage state, keyed by stage id string.
    pub stage_states: HashMap<String, StageState>,
    /// The HITL request currently blocking progress, if paused for HITL.
    pub pending_hitl: Option<HitlRequest>,
    /// Resume bookkeeping.
    pub cursor: WorkflowCursor,
}

impl From<&WorkflowState> for WorkflowSnapshot {
    fn from(state: &WorkflowState) -> Self {
        Self {
            workflow_id: state.workflow_id,
            session_id: state.session_id.clone(),
            phase: state.phase,
            plan: state.plan.clone(),
            stage_states: state.stage_states.clone(),
            pending_hitl: state.pending_hitl.clone(),
            cursor: state.cursor.clone(),
        }
    }
}

/// The apex orchestration component: admits workflow submissions,
/// drives each through a [`WorkflowRunner`], and exposes control operations.
///
/// Applies a spawn-under-a-semaphore-permit shape at three nested scopes
/// (admission, per-workflow stage concurrency, per-session exclusivity);
/// see [`AdmissionController`].
pub struct Engine {
    services: Arc<Services>,
    admission: Arc<AdmissionController>,
    handles: Arc<DashMap<WorkflowId, WorkflowHandle>>,
}

impl Engine {
    /// Construct an engine over `services`, admitting at most
    /// `services.config.engine.max_active_workflows` concurrent workflows.
    #[must_use]
    pub fn new(services: Services) -> Self {
        let max_active = services.config.engine.max_active_workflows;
        Self {
            services: Arc::new(services),
            admission: Arc::new(AdmissionController::new(max_active)),
            handles: Arc::new(DashMap::new()),
        }
    }

    /// Submit a new request. Admission happens in the background; the
    /// returned handle is live immediately so the caller can subscribe to
    /// events before the first stage runs.
    #[must_use]
    pub fn submit(&self, request: conclave_core::Request) -> WorkflowHandle {
        let workflow_id = request.workflow_id;
        let session_id = request.session_id.clone();
        let cancel = CancellationToken::new();
        let pause = Arc::new(PauseControl::default());
        let handle = WorkflowHandle {
            workflow_id,
            session_id: session_id.clone(),
            cancel: cancel.clone(),
            pause: Arc::clone(&pause),
        };
        self.handles.insert(workflow_id, handle.clone());

        self.services.events.publish(
            workflow_id,
            EventKind::Queued { position: self.admission.waiting_count() },
        );

        let services = Arc::clone(&self.services);
        let admission = Arc::clone(&self.admission);
        let handles = Arc::clone(&self.handles);
        tokio::spawn(async move {
            let _guard = admission.admit(&session_id).await;
            match WorkflowRunner::new_fresh(services, request, cancel, pause).await {
                Ok(runner) => runner.run(false).await,
                Err(e) => warn!(%workflow_id, error = %e, "failed to initialize workflow runner"),
            }
            handles.remove(&workflow_id);
        });

        handle
    }

    /// Resume a workflow from its last checkpoint, e.g. on process restart
    /// or after an explicit user pause. Fails if no checkpoint exists or
    /// the checkpoint is already in a terminal phase.
    ///
    /// `feedback`, when set, is written into the resumed workflow's shared
    /// context under `"user_feedback"` before the first stage runs again —
    /// the only path back to `running` from `paused (user)` carries
    /// resubmitted feedback rather than a bare unpause.
    pub async fn resume(
        &self,
        workflow_id: WorkflowId,
        feedback: Option<String>,
    ) -> EngineResult<WorkflowHandle> {
        let Some(mut state) = self.services.checkpoints.load(workflow_id).await? else {
            return Err(EngineError::InvalidInput(format!("no checkpoint for workflow {workflow_id}")));
        };
        if state.phase.is_terminal() {
            return Err(EngineError::InvalidInput(format!(
                "workflow {workflow_id} already reached a terminal phase"
            )));
        }
        if let Some(text) = feedback {
            state.shared_context.insert(
                "user_feedback".to_owned(),
                conclave_core::ContextEntry::new(
                    "resume".to_owned(),
                    "user",
                    serde_json::json!(text),
                    "feedback resubmitted on resume",
                ),
            );
        }

        let session_id = state.session_id.clone();
        let cancel = CancellationToken::new();
        let pause = Arc::new(PauseControl::default());
        let handle = WorkflowHandle {
            workflow_id,
            session_id: session_id.clone(),
            cancel: cancel.clone(),
            pause: Arc::clone(&pause),
        };
        self.handles.insert(workflow_id, handle.clone());

        let services = Arc::clone(&self.services);
        let admission = Arc::clone(&self.admission);
        let handles = Arc::clone(&self.handles);
        tokio::spawn(async move {
            let _guard = admission.admit(&session_id).await;
            match WorkflowRunner::new_resumed(services, state, cancel, pause).await {
                Ok(runner) => runner.run(true).await,
                Err(e) => warn!(%workflow_id, error = %e, "failed to reconstruct resumed workflow runner"),
            }
            handles.remove(&workflow_id);
        });

        Ok(handle)
    }

    /// Resume every non-terminal checkpoint found at startup, so the engine
    /// re-advertises in-flight workflows after a restart rather than losing
    /// them.
    pub async fn recover_pending(&self) -> EngineResult<Vec<WorkflowHandle>> {
        let pending = self.services.checkpoints.list_pending().await?;
        let mut handles = Vec::with_capacity(pending.len());
        for state in pending {
            info!(workflow_id = %state.workflow_id, "recovering pending workflow checkpoint");
            handles.push(self.resume(state.workflow_id, None).await?);
        }
        Ok(handles)
    }

    /// Request cancellation of a running workflow.
    pub fn cancel(&self, workflow_id: WorkflowId) -> EngineResult<()> {
        let handle = self
            .handles
            .get(&workflow_id)
            .ok_or_else(|| EngineError::InvalidInput(format!("workflow {workflow_id} is not running")))?;
        handle.cancel();
        Ok(())
    }

    /// Request a cooperative pause at the next stage boundary.
    pub fn pause(&self, workflow_id: WorkflowId) -> EngineResult<()> {
        let handle = self
            .handles
            .get(&workflow_id)
            .ok_or_else(|| EngineError::InvalidInput(format!("workflow {workflow_id} is not running")))?;
        handle.request_pause();
        Ok(())
    }

    /// Lift a pause on a workflow this process already has running
    /// in-memory, without going through the checkpoint store.
    pub fn unpause(&self, workflow_id: WorkflowId) -> EngineResult<()> {
        let handle = self
            .handles
            .get(&workflow_id)
            .ok_or_else(|| EngineError::InvalidInput(format!("workflow {workflow_id} is not running")))?;
        handle.unpause();
        Ok(())
    }

    /// Project the current checkpointed state of a workflow, if any.
    pub async fn status(&self, workflow_id: WorkflowId) -> EngineResult<Option<WorkflowSnapshot>> {
        Ok(self
            .services
            .checkpoints
            .load(workflow_id)
            .await?
            .as_ref()
            .map(WorkflowSnapshot::from))
    }

    /// List outstanding HITL requests, optionally scoped to one workflow.
    #[must_use]
    pub fn list_pending_hitl(&self, workflow_id: Option<WorkflowId>) -> Vec<HitlRequest> {
        self.services.hitl.list_pending(workflow_id)
    }

    /// Resolve a pending HITL request with a human's response.
    pub fn resolve_hitl(&self, request_id: RequestId, response: HitlResponse) -> EngineResult<()> {
        self.services.hitl.resolve(request_id, response)
    }

    /// Subscribe to a workflow's event stream.
    #[must_use]
    pub fn subscribe(&self, workflow_id: WorkflowId) -> EventReceiver {
        self.services.events.subscribe(workflow_id)
    }
}
