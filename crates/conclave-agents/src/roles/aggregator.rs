//! Aggregator: assembles the final user-facing response from prior
//! stage outputs. Produces no artifacts and no shared-context writes — its
//! only output is the response text the engine surfaces as the workflow's
//! terminal answer.

use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use conclave_core::plan::AgentRole;
use conclave_core::AgentOutput;
use conclave_llm::{ChatChunk, ChatOptions, EndpointPool};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::error::HandlerError;
use crate::handler::AgentHandler;
use crate::llm::turn_messages;
use crate::types::{HandlerEvent, HandlerStream, StageInput};

const SYSTEM_PROMPT: &str = r#"You are the Aggregator agent in a multi-agent coding workflow.
Summarize what the workflow accomplished for the user in plain prose. Do not
propose further file changes; just report the outcome. Reply with plain text,
not JSON."#;

/// Aggregator handler: one LLM turn synthesizing a final answer from every
/// resolved shared-context input the engine resolved for this stage.
pub struct AggregatorHandler {
    pool: Arc<EndpointPool>,
}

impl AggregatorHandler {
    /// Build a handler backed by `pool`.
    #[must_use]
    pub fn new(pool: Arc<EndpointPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AgentHandler for AggregatorHandler {
    fn role(&self) -> AgentRole {
        AgentRole::Aggregator
    }

    async fn execute(&self, input: StageInput, cancel: CancellationToken) -> HandlerStream {
        let pool = Arc::clone(&self.pool);
        let deadline = input.deadline;
        let prior: String = input
        .inputs
        .iter()
        .map(|(k, v)| format!("{k}: {v}\n"))
        .collect();
        let user_content = format!(
            "Original request: {}\nPrior stage outputs:\n{prior}",
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

                yield HandlerEvent::Done(Ok(AgentOutput::new(AgentRole::Aggregator, text)));
        })
    }
}

