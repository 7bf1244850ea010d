//! Reviewer: reads candidate artifacts from shared context and emits
//! issues/suggestions, optionally marking the stage `needs_refine` to trigger
//! the engine's refinement loop.

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

const SYSTEM_PROMPT: &str = r#"You are the Reviewer agent in a multi-agent coding workflow.
Read the candidate artifacts below and reply with exactly one JSON object:
 {"issues": ["..."], "suggestions": ["..."], "needs_refine": true|false}
Set "needs_refine" to true only when an issue should block acceptance."#;

#[derive(Deserialize)]
struct ReviewerReply {
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default)]
    suggestions: Vec<String>,
    #[serde(default)]
    needs_refine: bool,
}

/// Reviewer handler: one LLM turn over the artifacts produced by an earlier
/// stage, keyed by the `artifacts` shared-context input.
pub struct ReviewerHandler {
    pool: Arc<EndpointPool>,
}

impl ReviewerHandler {
    /// Build a handler backed by `pool`.
    #[must_use]
    pub fn new(pool: Arc<EndpointPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AgentHandler for ReviewerHandler {
    fn role(&self) -> AgentRole {
        AgentRole::Reviewer
    }

    async fn execute(&self, input: StageInput, cancel: CancellationToken) -> HandlerStream {
        let pool = Arc::clone(&self.pool);
        let deadline = input.deadline;
        let artifacts = input
        .input("artifacts")
        .cloned()
        .unwrap_or_else(|| serde_json::json!([]));
        let user_content = format!(
            "Task: {}\nCandidate artifacts:\n{artifacts}",
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

                let reply: ReviewerReply = match extract_json(&text).and_then(|v| {
                        serde_json::from_value(v).map_err(|e| HandlerError::InvalidOutput(e.to_string()))
                }) {
                    Ok(r) => r,
                    Err(e) => {
                        yield HandlerEvent::Done(Err(e));
                        return;
                    }
                };

                let mut output = AgentOutput::new(AgentRole::Reviewer, reply.suggestions.join("\n"));
                output.issues = reply.issues;
                output.needs_refine = reply.needs_refine;
                yield HandlerEvent::Done(Ok(output));
        })
    }
}

