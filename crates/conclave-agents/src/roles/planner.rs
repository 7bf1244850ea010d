//! Planner: an optional refinement step that expands an abstract
//! stage into a concrete, file-targeted list of steps before a Coder stage
//! runs. Uses the same stream-then-parse shape as
//! [`crate::roles::supervisor`], narrowed to a single structured reply with
//! no tool or HITL suspension points.

use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use conclave_core::plan::AgentRole;
use conclave_core::AgentOutput;
use conclave_llm::{ChatChunk, ChatOptions, EndpointPool};
use futures::StreamExt;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::error::HandlerError;
use crate::handler::AgentHandler;
use crate::llm::{extract_json, turn_messages};
use crate::types::{HandlerEvent, HandlerStream, StageInput};

const SYSTEM_PROMPT: &str = r#"You are the Planner agent in a multi-agent coding workflow.
Expand the given stage into a concrete, ordered list of steps, each naming the
files it targets. Reply with exactly one JSON object:
 {"steps": [{"description": "...", "file_targets": ["..."]}]}"#;

#[derive(Deserialize)]
struct PlannerReply {
    steps: Vec<PlanStep>,
}

#[derive(Deserialize, serde::Serialize)]
struct PlanStep {
    description: String,
    #[serde(default)]
    file_targets: Vec<String>,
}

/// Planner handler: one LLM turn producing a step list committed under
/// `plan_steps:{stage_id}`.
pub struct PlannerHandler {
    pool: Arc<EndpointPool>,
}

impl PlannerHandler {
    /// Build a handler backed by `pool`.
    #[must_use]
    pub fn new(pool: Arc<EndpointPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AgentHandler for PlannerHandler {
    fn role(&self) -> AgentRole {
        AgentRole::Planner
    }

    async fn execute(&self, input: StageInput, cancel: CancellationToken) -> HandlerStream {
        let pool = Arc::clone(&self.pool);
        let deadline = input.deadline;
        let stage_id = input.stage_id.to_string();
        let user_content = format!(
            "Stage to expand: {stage_id}\nTask: {}",
            input.request.user_message
        );

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
                        Ok(ChatChunk::Delta { text: t }) => {
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

                let reply: PlannerReply = match extract_json(&text).and_then(|v| {
                        serde_json::from_value(v).map_err(|e| HandlerError::InvalidOutput(e.to_string()))
                }) {
                    Ok(r) => r,
                    Err(e) => {
                        yield HandlerEvent::Done(Err(e));
                        return;
                    }
                };

                let steps_value = match serde_json::to_value(&reply.steps) {
                    Ok(v) => v,
                    Err(e) => {
                        yield HandlerEvent::Done(Err(HandlerError::InvalidOutput(e.to_string())));
                        return;
                    }
                };
                yield HandlerEvent::ContextWrite { key: format!("plan_steps:{stage_id}"), value: steps_value };
                yield HandlerEvent::Done(Ok(AgentOutput::new(AgentRole::Planner, "steps expanded")));
        })
    }
}

