//! Refiner: consumes prior artifacts plus the issues a Reviewer or
//! Gate stage raised and produces updated artifacts. Must preserve
//! `relative_path` exactly — a refined artifact naming a different path is a
//! handler error, not a rename — it is treated as invalid output and
//! escalated by the engine rather than silently honored.

use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use conclave_core::artifact::ArtifactAction;
use conclave_core::plan::AgentRole;
use conclave_core::{AgentOutput, Artifact};
use conclave_llm::{ChatChunk, ChatOptions, EndpointPool};
use futures::StreamExt;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::error::HandlerError;
use crate::handler::AgentHandler;
use crate::llm::{extract_json, turn_messages};
use crate::types::{HandlerEvent, HandlerStream, StageInput};

const SYSTEM_PROMPT: &str = r#"You are the Refiner agent in a multi-agent coding workflow.
You are given prior artifacts and the issues raised against them. Produce
updated artifact contents that address every issue. You MUST reuse the exact
same "relative_path" for every artifact you update; do not rename or add
paths. Reply with exactly one JSON object:
 {"artifacts": [{"relative_path": "...", "content": "...", "language": "..."}]}"#;

#[derive(Deserialize)]
struct RefinerReply {
    artifacts: Vec<ArtifactSpec>,
}

#[derive(Deserialize)]
struct ArtifactSpec {
    relative_path: String,
    content: String,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Deserialize, Clone)]
struct PriorArtifact {
    relative_path: String,
}

/// Refiner handler: one LLM turn producing corrected artifacts for the same
/// paths as the stage's prior `artifacts` input.
pub struct RefinerHandler {
    pool: Arc<EndpointPool>,
}

impl RefinerHandler {
    /// Build a handler backed by `pool`.
    #[must_use]
    pub fn new(pool: Arc<EndpointPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AgentHandler for RefinerHandler {
    fn role(&self) -> AgentRole {
        AgentRole::Refiner
    }

    async fn execute(&self, input: StageInput, cancel: CancellationToken) -> HandlerStream {
        let pool = Arc::clone(&self.pool);
        let deadline = input.deadline;
        let prior_artifacts: Vec<PriorArtifact> = input
        .input("artifacts")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();
        let artifacts_value = input.input("artifacts").cloned().unwrap_or_else(|| serde_json::json!([]));
        let issues = input.refine_issues.join("\n- ");
        let user_content = format!(
            "Task: {}\nPrior artifacts:\n{artifacts_value}\nIssues to fix:\n- {issues}",
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

                let reply: RefinerReply = match extract_json(&text).and_then(|v| {
                        serde_json::from_value(v).map_err(|e| HandlerError::InvalidOutput(e.to_string()))
                }) {
                    Ok(r) => r,
                    Err(e) => {
                        yield HandlerEvent::Done(Err(e));
                        return;
                    }
                };

                let known_paths: std::collections::HashSet<&str> =
                prior_artifacts.iter().map(|a| a.relative_path.as_str()).collect();

                if !known_paths.is_empty() {
                    for spec in &reply.artifacts {
                        if !known_paths.contains(spec.relative_path.as_str()) {
                            yield HandlerEvent::Done(Err(HandlerError::InvalidOutput(format!(
                                            "refined artifact path '{}' does not match any prior artifact path",
                                            spec.relative_path
                            ))));
                            return;
                        }
                    }
                }

                let mut output = AgentOutput::new(AgentRole::Refiner, "artifacts refined");
                for spec in reply.artifacts {
                    let artifact = Artifact::new(spec.relative_path, spec.content, ArtifactAction::Modified);
                    let artifact = match spec.language {
                        Some(lang) => artifact.with_language(lang),
                        None => artifact,
                    };
                    yield HandlerEvent::Artifact(artifact.clone());
                    output.artifacts.push(artifact);
                }
                yield HandlerEvent::Done(Ok(output));
        })
    }
}

