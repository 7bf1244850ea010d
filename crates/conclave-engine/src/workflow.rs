//! The per-workflow state machine (the apex of the engine): drives
//! one [`conclave_core::WorkflowState`] from `created` through to a
//! terminal phase, one scheduling wave at a time.
//!
//! Follows a spawn-poll-collect shape over a DAG rather than a flat task
//! list: [`scheduler::ready_stages`] recomputes readiness after every stage
//! completion and feeds the result back into the next scheduling wave,
//! instead of draining one fixed set of tasks.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use conclave_agents::{AgentHandler, HandlerError, HandlerEvent, StageInput};
use conclave_core::plan::{AgentRole, ParallelGroup, Stage, StageState};
use conclave_core::{
    Artifact, CheckpointType, ContextEntry, EngineError, EngineResult, EventKind, HitlRequest,
    HitlResponseAction, Plan, StageId, WorkflowId, WorkflowPhase, WorkflowState,
};
use conclave_context::SharedContext;
use conclave_hitl::HitlOutcome;
use conclave_tools::ToolContext;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::engine::Services;
use crate::scheduler;

/// Cooperative pause/resume signal for a running workflow.
///
/// Follows the same atomic-cell idiom as `conclave_tools::NetworkPolicy`:
/// a plain flag instead of a mutable singleton, plus a `Notify` so the
/// scheduling loop can block on resume without polling.
#[derive(Default)]
pub(crate) struct PauseControl {
    paused: AtomicBool,
    notify: tokio::sync::Notify,
}

impl PauseControl {
    pub(crate) fn request_pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub(crate) fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn is_pause_requested(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    async fn wait_for_resume(&self) {
        while self.is_pause_requested() {
            self.notify.notified().await;
        }
    }
}

/// Bookkeeping for the shadowed-write tie-break: the current writer of a
/// shared-context key, and the parallel group it wrote under (if any).
struct WriteRecord {
    stage_id: StageId,
    parallel_group: Option<ParallelGroup>,
}

/// Everything one spawned stage task needs, cloned out of the owning
/// [`WorkflowRunner`] so the task is `'static` inside a [`JoinSet`].
#[derive(Clone)]
struct StageCtx {
    services: Arc<Services>,
    state: Arc<Mutex<WorkflowState>>,
    shared_context: Arc<SharedContext>,
    session_root: PathBuf,
    cwd: Arc<RwLock<PathBuf>>,
    cancel: CancellationToken,
    workflow_id: WorkflowId,
}

/// What one stage invocation produced, collected back in the scheduling
/// loop once its task completes.
struct StageRunOutcome {
    stage: Stage,
    applied_artifacts: Vec<Artifact>,
    context_writes: HashMap<String, Value>,
    result: Result<conclave_core::AgentOutput, HandlerError>,
}

/// Drives one workflow's [`WorkflowState`] to completion.
///
/// Owns no long-lived lock: `state` is an `Arc<Mutex<..>>` shared with every
/// spawned stage task, since a HITL suspension needs to update
/// `pending_hitl`/`phase` and checkpoint from inside the stage that raised
/// it, before the engine's own loop regains control.
pub struct WorkflowRunner {
    workflow_id: WorkflowId,
    session_id: conclave_core::SessionId,
    services: Arc<Services>,
    state: Arc<Mutex<WorkflowState>>,
    shared_context: Arc<SharedContext>,
    session_root: PathBuf,
    cwd: Arc<RwLock<PathBuf>>,
    cancel: CancellationToken,
    pause: Arc<PauseControl>,
    deadline: tokio::time::Instant,
    retry_counts: Mutex<HashMap<String, u32>>,
}

impl WorkflowRunner {
    /// Construct a runner for a freshly submitted request.
    pub(crate) async fn new_fresh(
        services: Arc<Services>,
        request: conclave_core::Request,
        cancel: CancellationToken,
        pause: Arc<PauseControl>,
    ) -> EngineResult<Self> {
        let session_root = services
            .workspace
            .get_or_create_workspace(&request.session_id, &request.user_message)
            .await?;
        let workflow_id = request.workflow_id;
        let session_id = request.session_id.clone();
        let state = WorkflowState::new(workflow_id, session_id.clone(), request);
        Self::build(services, state, session_root, cancel, pause)
    }

    /// Reconstruct a runner from a loaded checkpoint.
    pub(crate) async fn new_resumed(
        services: Arc<Services>,
        state: WorkflowState,
        cancel: CancellationToken,
        pause: Arc<PauseControl>,
    ) -> EngineResult<Self> {
        let session_root = services
            .workspace
            .get_or_create_workspace(&state.session_id, &state.request.user_message)
            .await?;
        let runner = Self::build(services, state, session_root, cancel, pause)?;
        let restored = runner.state.lock().await;
        runner
            .shared_context
            .restore(restored.shared_context.clone(), restored.access_log.clone())
            .await;
        drop(restored);
        Ok(runner)
    }

    fn build(
        services: Arc<Services>,
        state: WorkflowState,
        session_root: PathBuf,
        cancel: CancellationToken,
        pause: Arc<PauseControl>,
    ) -> EngineResult<Self> {
        let workflow_id = state.workflow_id;
        let session_id = state.session_id.clone();
        let elapsed = (chrono::Utc::now() - state.started_at)
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        let budget = std::time::Duration::from_secs(services.config.engine.workflow_deadline_secs);
        let deadline = tokio::time::Instant::now() + budget.saturating_sub(elapsed);
        let shared_context = Arc::new(SharedContext::new(
            workflow_id,
            services.config.engine.max_context_entries,
            services.config.engine.max_context_bytes,
        ));
        Ok(Self {
            workflow_id,
            session_id,
            services,
            state: Arc::new(Mutex::new(state)),
            shared_context,
            cwd: Arc::new(RwLock::new(session_root.clone())),
            session_root,
            cancel,
            pause,
            deadline,
            retry_counts: Mutex::new(HashMap::new()),
        })
    }

    /// Run the workflow to a terminal phase, publishing a `resumed_from`
    /// marker first if this runner was reconstructed from a checkpoint.
    pub(crate) async fn run(self, resumed: bool) {
        if resumed {
            let seq = { self.state.lock().await.cursor.last_event_seq };
            self.services.events.seed_seq(self.workflow_id, seq);
            self.publish(EventKind::ResumedFrom { seq });
            self.services.hitl.sweep_expired();
        }

        if let Err(e) = self.drive().await {
            self.fail_workflow(e).await;
        }

        self.services.events.close(self.workflow_id);
    }

    async fn drive(&self) -> EngineResult<()> {
        let phase = { self.state.lock().await.phase };

        match phase {
            WorkflowPhase::Created => {
                self.transition_phase(WorkflowPhase::Planning).await?;
                self.checkpoint().await;
                if let Some(answer) = self.run_supervisor().await? {
                    return self.finalize_quick_qa(answer).await;
                }
                self.transition_phase(WorkflowPhase::Running).await?;
                self.checkpoint().await;
            }
            WorkflowPhase::Planning => {
                if let Some(answer) = self.run_supervisor().await? {
                    return self.finalize_quick_qa(answer).await;
                }
                self.transition_phase(WorkflowPhase::Running).await?;
                self.checkpoint().await;
            }
            _ if phase.is_terminal() => return Ok(()),
            _ => {
                // A stage caught mid-flight by a process restart cannot
                // resume its in-progress handler invocation (the stream is
                // gone); reset it to `Pending` so it re-runs from scratch.
                // Handlers are idempotent enough for this: artifact writes
                // are atomic, LLM calls simply repeat.
                self.reset_inflight_stages_for_resume().await;
                {
                    let mut state = self.state.lock().await;
                    state.pending_hitl = None;
                }
                if phase.is_paused() {
                    self.transition_phase(WorkflowPhase::Running).await?;
                }
                self.checkpoint().await;
            }
        }

        self.run_schedule().await?;
        self.finalize().await
    }

    async fn run_supervisor(&self) -> EngineResult<Option<String>> {
        let stage = Stage::new("supervisor-0", AgentRole::Supervisor);
        let request = { self.state.lock().await.request.clone() };
        let input = StageInput {
            stage_id: stage.stage_id.clone(),
            workflow_id: self.workflow_id,
            request,
            inputs: HashMap::new(),
            refine_issues: Vec::new(),
            deadline: stage.timeout,
        };
        self.publish(EventKind::StageStarted { stage_id: stage.stage_id.clone() });
        let ctx = self.stage_ctx();
        let outcome = run_stage(ctx, stage.clone(), input).await;

        match outcome.result {
            Ok(output) => {
                self.publish(EventKind::StageCompleted {
                    stage_id: stage.stage_id.clone(),
                    metrics: output.metrics.clone(),
                });
                match outcome.context_writes.get("plan").cloned() {
                    Some(value) => {
                        let plan: Plan = serde_json::from_value(value.clone()).map_err(|e| {
                            EngineError::Integrity(format!("invalid plan from supervisor: {e}"))
                        })?;
                        plan.validate().map_err(|bad| {
                            EngineError::Integrity(format!("plan fails validation at stage {bad}"))
                        })?;
                        {
                            let mut state = self.state.lock().await;
                            for s in &plan.stages {
                                state
                                    .stage_states
                                    .entry(s.stage_id.0.clone())
                                    .or_insert(StageState::Pending);
                            }
                            state.plan = plan;
                        }
                        let entry = ContextEntry::new(
                            stage.stage_id.0.clone(),
                            AgentRole::Supervisor.as_str(),
                            value,
                            "committed plan",
                        );
                        self.shared_context.put("plan", entry).await.ok();
                        Ok(None)
                    }
                    None => Ok(Some(output.text)),
                }
            }
            Err(e) => Err(EngineError::Integrity(format!("supervisor stage failed: {e}"))),
        }
    }

    async fn run_schedule(&self) -> EngineResult<()> {
        let max_parallel = self.services.config.engine.max_parallel_stages.max(1);
        let semaphore = Arc::new(Semaphore::new(max_parallel));
        let mut join_set: JoinSet<StageRunOutcome> = JoinSet::new();
        let mut spawned: std::collections::HashSet<String> = std::collections::HashSet::new();
        let mut context_writers: HashMap<String, WriteRecord> = HashMap::new();

        loop {
            if self.cancel.is_cancelled() {
                let _ = tokio::time::timeout(std::time::Duration::from_secs(2), async {
                    while join_set.join_next().await.is_some() {}
                })
                .await;
                return Err(EngineError::Cancelled(self.workflow_id));
            }
            if tokio::time::Instant::now() >= self.deadline {
                return Err(EngineError::DeadlineExceeded(self.workflow_id));
            }
            if self.pause.is_pause_requested() {
                self.suspend_for_user_pause().await?;
                continue;
            }

            let (stages, states, cleared, done) = {
                let state = self.state.lock().await;
                (
                    state.plan.stages.clone(),
                    state.stage_states.clone(),
                    state.hitl_cleared_stages.clone(),
                    state.all_stages_terminal(),
                )
            };
            if done && join_set.is_empty() {
                break;
            }

            let gate_candidate = scheduler::awaiting_hitl_gate(&stages, &states, &cleared)
                .into_iter()
                .find(|s| !spawned.contains(s.stage_id.0.as_str()))
                .cloned();
            if let Some(stage) = gate_candidate {
                self.gate_stage_for_hitl(&stage).await?;
                continue;
            }

            let ready: Vec<Stage> = scheduler::ready_stages(&stages, &states, &cleared)
                .into_iter()
                .filter(|s| !spawned.contains(s.stage_id.0.as_str()))
                .cloned()
                .collect();

            for stage in ready {
                spawned.insert(stage.stage_id.0.clone());
                self.mark_stage(&stage.stage_id, StageState::Ready).await;
                self.mark_stage(&stage.stage_id, StageState::Running).await;
                self.publish(EventKind::StageStarted { stage_id: stage.stage_id.clone() });

                let inputs = self.resolve_inputs(&stage).await;
                let refine_issues = self.resolve_refine_issues(&stage).await;
                let request = { self.state.lock().await.request.clone() };
                let input = StageInput {
                    stage_id: stage.stage_id.clone(),
                    workflow_id: self.workflow_id,
                    request,
                    inputs,
                    refine_issues,
                    deadline: stage.timeout,
                };

                let permit = Arc::clone(&semaphore)
                    .acquire_owned()
                    .await
                    .expect("semaphore is never closed while the runner is alive");
                let ctx = self.stage_ctx();
                let stage_clone = stage.clone();
                join_set.spawn(async move {
                    let _permit = permit;
                    run_stage(ctx, stage_clone, input).await
                });
            }

            if join_set.is_empty() {
                break;
            }

            let Some(joined) = join_set.join_next().await else {
                continue;
            };
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(join_err) => {
                    warn!(workflow_id = %self.workflow_id, error = %join_err, "stage task panicked");
                    continue;
                }
            };
            spawned.remove(outcome.stage.stage_id.0.as_str());

            if let Some(retry_stage) = self.apply_stage_outcome(outcome, &mut context_writers).await? {
                spawned.insert(retry_stage.stage_id.0.clone());
                let permit = Arc::clone(&semaphore)
                    .acquire_owned()
                    .await
                    .expect("semaphore is never closed while the runner is alive");
                let ctx = self.stage_ctx();
                let inputs = self.resolve_inputs(&retry_stage).await;
                let refine_issues = self.resolve_refine_issues(&retry_stage).await;
                let request = { self.state.lock().await.request.clone() };
                let input = StageInput {
                    stage_id: retry_stage.stage_id.clone(),
                    workflow_id: self.workflow_id,
                    request,
                    inputs,
                    refine_issues,
                    deadline: retry_stage.timeout,
                };
                let retry_stage_clone = retry_stage.clone();
                join_set.spawn(async move {
                    let _permit = permit;
                    run_stage(ctx, retry_stage_clone, input).await
                });
            }
            self.checkpoint().await;
        }

        Ok(())
    }

    async fn apply_stage_outcome(
        &self,
        outcome: StageRunOutcome,
        writers: &mut HashMap<String, WriteRecord>,
    ) -> EngineResult<Option<Stage>> {
        let StageRunOutcome { stage, applied_artifacts, context_writes, result } = outcome;

        match result {
            Ok(output) => {
                for (key, value) in context_writes {
                    self.commit_context_write(&stage, key, value, writers).await;
                }
                if !applied_artifacts.is_empty() {
                    self.merge_artifacts(&stage, &applied_artifacts).await;
                }
                if stage.agent_role == AgentRole::Aggregator {
                    let entry = ContextEntry::new(
                        stage.stage_id.0.clone(),
                        AgentRole::Aggregator.as_str(),
                        json!(output.text),
                        "final workflow summary",
                    );
                    self.shared_context.put("final_summary", entry).await.ok();
                }

                self.mark_stage(&stage.stage_id, StageState::Completed).await;
                self.publish(EventKind::StageCompleted {
                    stage_id: stage.stage_id.clone(),
                    metrics: output.metrics.clone(),
                });
                {
                    let mut state = self.state.lock().await;
                    state.cursor.completed_stage_ids.push(stage.stage_id.0.clone());
                }

                if output.needs_refine {
                    self.handle_refinement(&stage, &output.issues).await?;
                }
                Ok(None)
            }
            Err(err) => self.handle_stage_failure(&stage, err).await,
        }
    }

    async fn handle_stage_failure(&self, stage: &Stage, err: HandlerError) -> EngineResult<Option<Stage>> {
        let transient = err.is_transient();
        let reason = err.to_string();

        if transient {
            let mut retries = self.retry_counts.lock().await;
            let count = retries.entry(stage.stage_id.0.clone()).or_insert(0);
            if *count < stage.retry_policy.max_retries {
                *count += 1;
                self.publish(EventKind::StageFailed {
                    stage_id: stage.stage_id.clone(),
                    reason,
                    transient: true,
                });
                return Ok(Some(stage.clone()));
            }
        }

        self.mark_stage(&stage.stage_id, StageState::Failed).await;
        self.publish(EventKind::StageFailed { stage_id: stage.stage_id.clone(), reason, transient });
        let downstream = {
            let state = self.state.lock().await;
            scheduler::downstream_of(&state.plan.stages, stage.stage_id.0.as_str())
        };
        for id in downstream {
            self.mark_stage(&StageId::from(id), StageState::Skipped).await;
        }
        Ok(None)
    }

    async fn handle_refinement(&self, stage: &Stage, issues: &[String]) -> EngineResult<()> {
        let max_iterations = self.services.config.engine.max_refinement_iterations;
        let iteration = {
            let mut state = self.state.lock().await;
            state.cursor.refinement_iterations = state.cursor.refinement_iterations.saturating_add(1);
            state.cursor.refinement_iterations
        };

        if iteration > max_iterations {
            let request = HitlRequest::new(
                self.workflow_id,
                stage.stage_id.clone(),
                CheckpointType::Review,
                "Refinement budget exhausted",
                format!(
                    "{} kept flagging issues after {max_iterations} refinement iterations; manual review required",
                    stage.agent_role.as_str()
                ),
            )
            .with_content(json!({ "issues": issues }));
            return self.raise_workflow_hitl(request).await;
        }

        let refiner_id = StageId::from(format!("refiner-{iteration}"));
        let recheck_id = StageId::from(format!("{}-{iteration}", stage.agent_role.as_str()));

        let mut refiner_stage = Stage::new(refiner_id.clone(), AgentRole::Refiner).depends_on(stage.stage_id.clone());
        let mut recheck_stage = Stage::new(recheck_id.clone(), stage.agent_role).depends_on(refiner_id.clone());
        if let Some(group) = &stage.parallel_group {
            refiner_stage = refiner_stage.in_parallel_group(group.0.clone());
            recheck_stage = recheck_stage.in_parallel_group(group.0.clone());
        }

        {
            let mut state = self.state.lock().await;
            state.plan.stages.push(refiner_stage);
            state.plan.stages.push(recheck_stage);
            state.stage_states.insert(refiner_id.0.clone(), StageState::Pending);
            state.stage_states.insert(recheck_id.0.clone(), StageState::Pending);
        }

        let entry = ContextEntry::new(
            stage.stage_id.0.clone(),
            stage.agent_role.as_str(),
            json!(issues),
            "issues fed into refinement",
        );
        self.shared_context
            .put(format!("refine_issues:{}", refiner_id.0), entry)
            .await
            .ok();
        Ok(())
    }

    /// Pre-run gate for a stage whose plan entry set `requires_hitl = true`:
    /// raises an approval checkpoint and blocks the scheduling loop until
    /// it resolves, then records the stage as cleared so
    /// [`scheduler::ready_stages`] admits it on the next pass.
    async fn gate_stage_for_hitl(&self, stage: &Stage) -> EngineResult<()> {
        let request = HitlRequest::new(
            self.workflow_id,
            stage.stage_id.clone(),
            CheckpointType::Approval,
            format!("Approve stage '{}'", stage.stage_id.0),
            format!(
                "The plan marks stage '{}' ({}) as requiring approval before it runs.",
                stage.stage_id.0,
                stage.agent_role.as_str()
            ),
        );
        self.raise_workflow_hitl(request).await?;
        let mut state = self.state.lock().await;
        state.hitl_cleared_stages.insert(stage.stage_id.0.clone());
        Ok(())
    }

    async fn raise_workflow_hitl(&self, request: HitlRequest) -> EngineResult<()> {
        {
            let mut state = self.state.lock().await;
            state.pending_hitl = Some(request.clone());
            if let Ok(next) = state.phase.transition(WorkflowPhase::PausedHitl) {
                state.phase = next;
            }
        }
        self.checkpoint().await;

        let waiter = self.services.hitl.register(request.clone(), self.cancel.clone());
        let outcome = waiter.wait().await;

        {
            let mut state = self.state.lock().await;
            state.pending_hitl = None;
            if let Ok(next) = state.phase.transition(WorkflowPhase::Running) {
                state.phase = next;
            }
        }
        self.checkpoint().await;

        match outcome {
            HitlOutcome::Resolved(response) => match response.action {
                HitlResponseAction::Approve | HitlResponseAction::Confirm | HitlResponseAction::Retry => Ok(()),
                _ => Err(EngineError::Permanent {
                    stage: request.stage_id.clone(),
                    reason: "refinement review rejected by human".into(),
                }),
            },
            HitlOutcome::Cancelled => Err(EngineError::Cancelled(self.workflow_id)),
            HitlOutcome::Expired => Err(EngineError::Permanent {
                stage: request.stage_id.clone(),
                reason: "refinement review request expired".into(),
            }),
        }
    }

    async fn suspend_for_user_pause(&self) -> EngineResult<()> {
        self.transition_phase(WorkflowPhase::PausedUser).await?;
        self.checkpoint().await;
        self.pause.wait_for_resume().await;
        if self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled(self.workflow_id));
        }
        self.transition_phase(WorkflowPhase::Running).await?;
        self.checkpoint().await;
        Ok(())
    }

    async fn finalize(&self) -> EngineResult<()> {
        let any_failed = {
            let state = self.state.lock().await;
            state.stage_states.values().any(|s| matches!(s, StageState::Failed))
        };
        if any_failed {
            return Err(EngineError::Permanent {
                stage: StageId::from("workflow"),
                reason: "one or more stages failed permanently".into(),
            });
        }

        self.transition_phase(WorkflowPhase::Finalizing).await?;
        self.checkpoint().await;

        let summary = match self.shared_context.peek("final_summary").await {
            Some(entry) => entry.value.as_str().map(str::to_owned).unwrap_or_default(),
            None => "workflow completed".to_owned(),
        };

        self.transition_phase(WorkflowPhase::Completed).await?;
        self.checkpoint().await;
        self.publish(EventKind::WorkflowCompleted { summary: summary.clone() });
        self.record_summary(&summary, "completed").await;
        Ok(())
    }

    async fn finalize_quick_qa(&self, answer: String) -> EngineResult<()> {
        self.transition_phase(WorkflowPhase::Running).await?;
        self.transition_phase(WorkflowPhase::Finalizing).await?;
        self.transition_phase(WorkflowPhase::Completed).await?;
        self.checkpoint().await;
        self.publish(EventKind::WorkflowCompleted { summary: answer.clone() });
        self.record_summary(&answer, "completed").await;
        Ok(())
    }

    async fn fail_workflow(&self, err: EngineError) {
        if matches!(err, EngineError::Cancelled(_)) {
            {
                let mut state = self.state.lock().await;
                if let Ok(next) = state.phase.transition(WorkflowPhase::Cancelled) {
                    state.phase = next;
                }
            }
            self.checkpoint().await;
            self.publish(EventKind::WorkflowCancelled);
            self.record_summary("workflow cancelled", "cancelled").await;
            return;
        }

        let reason_tag = match &err {
            EngineError::DeadlineExceeded(_) => "deadline_exceeded",
            EngineError::ResourceExhausted { .. } => "resource_exhausted",
            EngineError::Integrity(_) => "integrity",
            _ => "failed",
        };
        let details = err.to_string();

        {
            let mut state = self.state.lock().await;
            match state.phase.transition(WorkflowPhase::Failed) {
                Ok(next) => state.phase = next,
                Err(_) => {
                    warn!(workflow_id = %self.workflow_id, phase = ?state.phase, "forcing workflow to failed from an unexpected phase");
                    state.phase = WorkflowPhase::Failed;
                }
            }
        }
        self.checkpoint().await;
        self.publish(EventKind::WorkflowFailed { reason: reason_tag.to_owned(), details: details.clone() });
        self.record_summary(&details, "failed").await;
    }

    async fn resolve_inputs(&self, stage: &Stage) -> HashMap<String, Value> {
        if stage.inputs_refs.is_empty() {
            self.shared_context
                .snapshot()
                .await
                .into_iter()
                .map(|(k, v)| (k, v.value))
                .collect()
        } else {
            let mut inputs = HashMap::new();
            for key in &stage.inputs_refs {
                if let Some(value) = self.shared_context.get(key, stage.stage_id.0.clone()).await {
                    inputs.insert(key.clone(), value);
                }
            }
            inputs
        }
    }

    async fn resolve_refine_issues(&self, stage: &Stage) -> Vec<String> {
        let key = format!("refine_issues:{}", stage.stage_id.0);
        match self.shared_context.peek(&key).await {
            Some(entry) => serde_json::from_value(entry.value).unwrap_or_default(),
            None => Vec::new(),
        }
    }

    async fn commit_context_write(
        &self,
        stage: &Stage,
        key: String,
        value: Value,
        writers: &mut HashMap<String, WriteRecord>,
    ) {
        let stage_id = stage.stage_id.clone();
        let apply = match writers.get(&key) {
            None => true,
            Some(prev) => {
                let same_group = stage.parallel_group.is_some() && prev.parallel_group == stage.parallel_group;
                !same_group || stage_id < prev.stage_id
            }
        };

        if apply {
            let entry = ContextEntry::new(
                stage_id.0.clone(),
                stage.agent_role.as_str(),
                value,
                format!("write from {}", stage_id.0),
            );
            if let Err(e) = self.shared_context.put(key.clone(), entry).await {
                warn!(workflow_id = %self.workflow_id, key = %key, error = %e, "context write rejected");
            } else {
                writers.insert(key, WriteRecord { stage_id, parallel_group: stage.parallel_group.clone() });
            }
        } else {
            self.shared_context.record_shadowed(key, stage_id.0).await;
        }
    }

    async fn merge_artifacts(&self, stage: &Stage, applied: &[Artifact]) {
        let existing = self.shared_context.peek("artifacts").await;
        let mut by_path: Vec<Value> = existing
            .map(|e| serde_json::from_value::<Vec<Value>>(e.value).unwrap_or_default())
            .unwrap_or_default();

        for artifact in applied {
            let serialized = serde_json::to_value(artifact).unwrap_or(Value::Null);
            if let Some(pos) = by_path
                .iter()
                .position(|v| v.get("relative_path").and_then(Value::as_str) == Some(artifact.relative_path.as_str()))
            {
                by_path[pos] = serialized;
            } else {
                by_path.push(serialized);
            }
        }

        let entry = ContextEntry::new(
            stage.stage_id.0.clone(),
            stage.agent_role.as_str(),
            json!(by_path),
            "accumulated artifacts",
        );
        if let Err(e) = self.shared_context.put("artifacts", entry).await {
            warn!(workflow_id = %self.workflow_id, error = %e, "failed to record accumulated artifacts");
        }
    }

    async fn reset_inflight_stages_for_resume(&self) {
        let mut state = self.state.lock().await;
        let stuck: Vec<String> = state
            .stage_states
            .iter()
            .filter(|(_, s)| matches!(s, StageState::Running | StageState::AwaitingHitl))
            .map(|(k, _)| k.clone())
            .collect();
        for key in stuck {
            state.stage_states.insert(key, StageState::Pending);
        }
    }

    async fn mark_stage(&self, stage_id: &StageId, to: StageState) {
        let mut state = self.state.lock().await;
        let key = stage_id.0.clone();
        let current = state.stage_states.get(&key).copied();
        let result = match current {
            Some(s) => s.transition(to),
            None => Ok(to),
        };
        match result {
            Ok(next) => {
                state.stage_states.insert(key, next);
            }
            Err(_) => warn!(stage_id = %key, ?current, ?to, "rejected illegal stage transition"),
        }
    }

    async fn transition_phase(&self, to: WorkflowPhase) -> EngineResult<()> {
        let mut state = self.state.lock().await;
        match state.phase.transition(to) {
            Ok(next) => {
                state.phase = next;
                Ok(())
            }
            Err(_) => Err(EngineError::Integrity(format!("illegal phase transition to {to:?}"))),
        }
    }

    async fn checkpoint(&self) {
        let mut state = self.state.lock().await;
        state.shared_context = self.shared_context.snapshot().await;
        state.access_log = self.shared_context.access_log().await;
        state.cursor.checkpoint_count = state.cursor.checkpoint_count.saturating_add(1);
        state.cursor.last_event_seq = self.services.events.peek_next_seq(self.workflow_id);
        if let Err(e) = self.services.checkpoints.save(&state).await {
            warn!(workflow_id = %self.workflow_id, error = %e, "checkpoint save failed");
        }
    }

    async fn record_summary(&self, text: &str, outcome: &str) {
        let summary = conclave_storage::WorkflowSummary {
            workflow_id: self.workflow_id.to_string(),
            outcome: outcome.to_owned(),
            text: text.to_owned(),
            timestamp: chrono::Utc::now(),
        };
        if let Err(e) = self.services.conversations.append_summary(&self.session_id, summary).await {
            warn!(workflow_id = %self.workflow_id, error = %e, "failed to record workflow summary");
        }
    }

    fn publish(&self, kind: EventKind) {
        self.services.events.publish(self.workflow_id, kind);
    }

    fn stage_ctx(&self) -> StageCtx {
        StageCtx {
            services: Arc::clone(&self.services),
            state: Arc::clone(&self.state),
            shared_context: Arc::clone(&self.shared_context),
            session_root: self.session_root.clone(),
            cwd: Arc::clone(&self.cwd),
            cancel: self.cancel.clone(),
            workflow_id: self.workflow_id,
        }
    }
}

/// Checkpoint the shared state from inside a spawned stage task, used only
/// by the HITL suspension path (which must save before it awaits a human).
async fn checkpoint_now(ctx: &StageCtx) {
    let mut state = ctx.state.lock().await;
    state.shared_context = ctx.shared_context.snapshot().await;
    state.access_log = ctx.shared_context.access_log().await;
    state.cursor.checkpoint_count = state.cursor.checkpoint_count.saturating_add(1);
    state.cursor.last_event_seq = ctx.services.events.peek_next_seq(state.workflow_id);
    if let Err(e) = ctx.services.checkpoints.save(&state).await {
        warn!(workflow_id = %state.workflow_id, error = %e, "checkpoint save failed");
    }
}

/// Drive one stage's handler stream to completion, applying artifacts and
/// dispatching tool/HITL requests as they arrive.
async fn run_stage(ctx: StageCtx, stage: Stage, input: StageInput) -> StageRunOutcome {
    let Some(handler) = ctx.services.handlers.get(stage.agent_role) else {
        return StageRunOutcome {
            stage,
            applied_artifacts: Vec::new(),
            context_writes: HashMap::new(),
            result: Err(HandlerError::InvalidOutput("no handler registered for role".into())),
        };
    };

    let mut stream = handler.execute(input, ctx.cancel.clone()).await;
    let mut applied_artifacts = Vec::new();
    let mut context_writes: HashMap<String, Value> = HashMap::new();

    loop {
        let Some(event) = stream.next().await else {
            return StageRunOutcome {
                stage,
                applied_artifacts,
                context_writes,
                result: Err(HandlerError::EngineDisconnected),
            };
        };

        match event {
            HandlerEvent::DeltaText(delta) => {
                ctx.services.events.publish(
                    ctx.workflow_id,
                    EventKind::StageStreamChunk { stage_id: stage.stage_id.clone(), delta },
                );
            }
            HandlerEvent::Artifact(artifact) => {
                match ctx.services.workspace.apply_artifact(&ctx.session_root, artifact).await {
                    Ok(applied) => {
                        ctx.services.events.publish(
                            ctx.workflow_id,
                            EventKind::ArtifactApplied {
                                stage_id: stage.stage_id.clone(),
                                artifact: applied.clone(),
                            },
                        );
                        applied_artifacts.push(applied);
                    }
                    Err(e) => {
                        warn!(stage_id = %stage.stage_id.0, error = %e, "failed to apply artifact");
                    }
                }
            }
            HandlerEvent::ContextWrite { key, value } => {
                context_writes.insert(key, value);
            }
            HandlerEvent::ToolCallRequest { request, respond } => {
                let tool_ctx = ToolContext::with_shared_cwd(ctx.session_root.clone(), Arc::clone(&ctx.cwd));
                let executor = conclave_tools::ToolExecutor::new(&ctx.services.tools);
                let outcome = executor
                    .invoke(&request.tool_name, request.params, &tool_ctx, stage.timeout, &ctx.cancel)
                    .await;
                let response = if outcome.success {
                    Ok(outcome.output)
                } else {
                    Err(outcome.error.unwrap_or_else(|| "tool invocation failed".to_owned()))
                };
                let _ = respond.send(response);
            }
            HandlerEvent::HitlRequest { request, respond } => {
                {
                    let mut state = ctx.state.lock().await;
                    state.pending_hitl = Some(request.clone());
                    if let Ok(next) = state.phase.transition(WorkflowPhase::PausedHitl) {
                        state.phase = next;
                    }
                }
                checkpoint_now(&ctx).await;

                let waiter = ctx.services.hitl.register(request.clone(), ctx.cancel.clone());
                let outcome = waiter.wait().await;
                let response = match outcome {
                    HitlOutcome::Resolved(resp) => Some(resp),
                    HitlOutcome::Cancelled | HitlOutcome::Expired => None,
                };

                {
                    let mut state = ctx.state.lock().await;
                    state.pending_hitl = None;
                    if let Ok(next) = state.phase.transition(WorkflowPhase::Running) {
                        state.phase = next;
                    }
                }
                checkpoint_now(&ctx).await;
                let _ = respond.send(response);
            }
            HandlerEvent::Done(result) => {
                let result = result.map(|mut output| {
                    for (k, v) in std::mem::take(&mut output.context_writes) {
                        context_writes.entry(k).or_insert(v);
                    }
                    output
                });
                return StageRunOutcome { stage, applied_artifacts, context_writes, result };
            }
        }
    }
}
