//! The input/output shape every handler agrees on.

use std::collections::HashMap;
use std::pin::Pin;

use conclave_core::agent_output::ToolCallRequest;
use conclave_core::{AgentOutput, Artifact, HitlRequest, HitlResponse, Request, StageId, WorkflowId};
use futures::Stream;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::HandlerError;

/// Everything a handler needs to run one stage invocation.
///
/// `inputs` holds the shared-context values already resolved for the
/// stage's `inputs_refs`, keyed by the same key they were written under —
/// handlers never talk to [`conclave_context::SharedContext`] directly,
/// the engine resolves reads and commits writes around them.
#[derive(Debug, Clone)]
pub struct StageInput {
    /// Stage this invocation is running.
    pub stage_id: StageId,
    /// Owning workflow.
    pub workflow_id: WorkflowId,
    /// The request that started the workflow, carried through for
    /// Supervisor/Aggregator stages that need the original user message.
    pub request: Request,
    /// Resolved shared-context reads.
    pub inputs: HashMap<String, Value>,
    /// Issues/findings fed back into a Refiner stage, if this invocation is
    /// a refinement iteration.
    pub refine_issues: Vec<String>,
    /// Remaining time budget for this invocation, derived from the stage's
    /// configured timeout minus time already spent (e.g. on a retry).
    pub deadline: std::time::Duration,
}

impl StageInput {
    /// Look up a resolved input by key and deserialize it.
    #[must_use]
    pub fn input(&self, key: &str) -> Option<&Value> {
        self.inputs.get(key)
    }
}

/// One event a handler emits while running a stage. The Workflow Engine
/// relays each to the Event Bus as the matching typed event, applying
/// `Artifact`/`ContextWrite` events through C2/C5 and intercepting
/// `ToolCallRequest`/`HitlRequest`.
///
/// `ToolCallRequest` and `HitlRequest` carry a one-shot responder: the
/// handler's generator awaits it in place, so "the engine suspends the
/// stage's coroutine" is realized as the handler's own future not making
/// further progress until the engine calls `respond.send(..)` — no separate
/// suspend/resume protocol is needed on top of the stream itself.
pub enum HandlerEvent {
    /// Incremental text, relayed for UI streaming.
    DeltaText(String),
    /// A file artifact produced by the stage.
    Artifact(Artifact),
    /// A shared-context write the stage wants committed.
    ContextWrite {
        /// Key to write under.
        key: String,
        /// Value to store.
        value: Value,
    },
    /// A tool call the engine must validate, dispatch, and answer.
    ToolCallRequest {
        /// The call itself.
        request: ToolCallRequest,
        /// Channel the engine sends the tool's textual output on.
        respond: oneshot::Sender<Result<String, String>>,
    },
    /// A HITL checkpoint the engine must checkpoint, register with C6, and
    /// answer once a human (or cancellation/expiry) resolves it.
    HitlRequest {
        /// The request itself.
        request: HitlRequest,
        /// Channel the engine sends the resolution on. A `None` means the
        /// request was cancelled or expired rather than answered.
        respond: oneshot::Sender<Option<HitlResponse>>,
    },
    /// Terminal: the stage finished, successfully or not.
    Done(Result<AgentOutput, HandlerError>),
}

/// The stream every [`crate::AgentHandler::execute`] returns.
pub type HandlerStream = Pin<Box<dyn Stream<Item = HandlerEvent> + Send>>;

