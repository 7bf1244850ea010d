//! Supervisor: decomposes the user message into a `Plan`, or answers
//! directly for a `quick_qa` turn with no downstream stages.

use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use conclave_core::plan::{AgentRole, ParallelGroup, Plan, RetryPolicy, Stage};
use conclave_core::{AgentOutput, StageId};
use conclave_llm::{ChatOptions, EndpointPool};
use futures::StreamExt;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::error::HandlerError;
use crate::handler::AgentHandler;
use crate::llm::{extract_json, turn_messages};
use crate::types::{HandlerEvent, HandlerStream, StageInput};

const SYSTEM_PROMPT: &str = r#"You are the Supervisor of a multi-agent coding workflow.
Read the user's request and either:
 1. Decide it is a quick question that needs no code changes, and reply with
 {"response_type": "quick_qa", "answer": "<direct answer>"}
 2. Decompose it into a plan, and reply with
 {"response_type": "plan", "stages": [{"stage_id": "...", "role": "coder|reviewer|qa_gate|security_gate|aggregator", "depends_on": ["..."], "parallel_group": "..." }]}
Reply with exactly one JSON object and nothing else."#;

#[derive(Deserialize)]
#[serde(tag = "response_type", rename_all = "snake_case")]
enum SupervisorReply {
    QuickQa { answer: String },
    Plan { stages: Vec<PlanStageSpec> },
}

#[derive(Deserialize)]
struct PlanStageSpec {
    stage_id: String,
    role: String,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    parallel_group: Option<String>,
}

fn role_from_str(s: &str) -> Option<AgentRole> {
    match s {
        "supervisor" => Some(AgentRole::Supervisor),
        "planner" => Some(AgentRole::Planner),
        "coder" => Some(AgentRole::Coder),
        "reviewer" => Some(AgentRole::Reviewer),
        "qa_gate" => Some(AgentRole::QaGate),
        "security_gate" => Some(AgentRole::SecurityGate),
        "refiner" => Some(AgentRole::Refiner),
        "aggregator" => Some(AgentRole::Aggregator),
        _ => None,
    }
}

/// Supervisor handler: one LLM turn, parsed into either a quick answer or a
/// plan committed to shared context under the `plan` key.
pub struct SupervisorHandler {
    pool: Arc<EndpointPool>,
}

impl SupervisorHandler {
    /// Build a handler backed by `pool`.
    #[must_use]
    pub fn new(pool: Arc<EndpointPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AgentHandler for SupervisorHandler {
    fn role(&self) -> AgentRole {
        AgentRole::Supervisor
    }

    async fn execute(&self, input: StageInput, cancel: CancellationToken) -> HandlerStream {
        let pool = Arc::clone(&self.pool);
        let deadline = input.deadline;

        let history: String = input
        .request
        .conversation_history
        .iter()
        .map(|turn| format!("{}: {}\n", turn.role, turn.content))
        .collect();
        let user_content = format!("{history}user: {}", input.request.user_message);

        Box::pin(stream! {
                let messages = turn_messages(SYSTEM_PROMPT, &user_content);
                let mut llm_stream = match pool.chat_stream(&messages, &ChatOptions::default(), deadline, cancel).await {
                    Ok(s) => s,
                    Err(e) => {
                        yield HandlerEvent::Done(Err(HandlerError::from(e)));
                        return;
                    }
                };

                let mut text = String::new();
                while let Some(chunk) = llm_stream.next().await {
                    match chunk {
                        Ok(conclave_llm::ChatChunk::Delta { text: t }) => {
                            text.push_str(&t);
                            yield HandlerEvent::DeltaText(t);
                        }
                        Ok(_) => {}
                        Err(e) => {
                            yield HandlerEvent::Done(Err(HandlerError::from(e)));
                            return;
                        }
                    }
                }

                let reply: SupervisorReply = match extract_json(&text).and_then(|v| {
                        serde_json::from_value(v).map_err(|e| HandlerError::InvalidOutput(e.to_string()))
                }) {
                    Ok(r) => r,
                    Err(e) => {
                        yield HandlerEvent::Done(Err(e));
                        return;
                    }
                };

                match reply {
                    SupervisorReply::QuickQa { answer } => {
                        yield HandlerEvent::Done(Ok(AgentOutput::new(AgentRole::Supervisor, answer)));
                    }
                    SupervisorReply::Plan { stages } => {
                        let mut built = Vec::with_capacity(stages.len());
                        for spec in stages {
                            let Some(role) = role_from_str(&spec.role) else {
                                yield HandlerEvent::Done(Err(HandlerError::InvalidOutput(format!(
                                                "unknown role '{}' in plan", spec.role
                                ))));
                                return;
                            };
                            let mut stage = Stage {
                                stage_id: StageId::from(spec.stage_id),
                                agent_role: role,
                                inputs_refs: Vec::new(),
                                depends_on: spec.depends_on.into_iter().map(StageId::from).collect(),
                                requires_hitl: false,
                                retry_policy: RetryPolicy::default(),
                                timeout: Duration::from_secs(120),
                                parallel_group: None,
                            };
                            stage.parallel_group = spec.parallel_group.map(ParallelGroup);
                            built.push(stage);
                        }
                        let plan = Plan::new(built);
                        if let Err(bad_stage) = plan.validate() {
                            yield HandlerEvent::Done(Err(HandlerError::InvalidOutput(format!(
                                            "plan failed validation at stage '{bad_stage}'"
                            ))));
                            return;
                        }

                        let plan_value = match serde_json::to_value(&plan) {
                            Ok(v) => v,
                            Err(e) => {
                                yield HandlerEvent::Done(Err(HandlerError::InvalidOutput(e.to_string())));
                                return;
                            }
                        };
                        yield HandlerEvent::ContextWrite { key: "plan".to_owned(), value: plan_value };
                        yield HandlerEvent::Done(Ok(AgentOutput::new(AgentRole::Supervisor, "plan committed")));
                    }
                }
        })
    }
}

