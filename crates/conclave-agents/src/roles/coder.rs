//! Coder: produces file artifacts, optionally reading the workspace
//! first via `read_file`/`list_directory` tool calls dispatched by the
//! engine.
//!
//! Follows a stream-then-act shape (stream a turn, inspect its structured
//! intent, act, loop), narrowed here to a JSON `{"action": ...}` envelope
//! instead of native tool-call deltas, since tool dispatch is the engine's
//! job, not this adapter's (the LLM adapter carries no tool-call plumbing).

use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use conclave_core::agent_output::ToolCallRequest;
use conclave_core::artifact::ArtifactAction;
use conclave_core::plan::AgentRole;
use conclave_core::{AgentOutput, Artifact};
use conclave_llm::{ChatChunk, ChatMessage, ChatOptions, EndpointPool};
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::HandlerError;
use crate::handler::AgentHandler;
use crate::llm::extract_json;
use crate::types::{HandlerEvent, HandlerStream, StageInput};

const SYSTEM_PROMPT: &str = r#"You are the Coder agent in a multi-agent coding workflow.
You may inspect the workspace before writing code. Reply with exactly one JSON object per turn:
 - To read a file: {"action": "read_file", "path": "..."}
 - To list a directory: {"action": "list_directory", "path": "..."}
 - To finish: {"action": "write", "artifacts": [{"relative_path": "...", "content": "...", "language": "...", "op": "created|modified|deleted"}]}
Never mix a tool call and a finish in the same reply."#;

const MAX_TOOL_ROUNDS: u32 = 6;

#[derive(Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum CoderAction {
    ReadFile { path: String },
    ListDirectory { path: String },
    Write { artifacts: Vec<ArtifactSpec> },
}

#[derive(Deserialize)]
struct ArtifactSpec {
    relative_path: String,
    content: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default = "default_op")]
    op: String,
}

fn default_op() -> String {
    "created".to_owned()
}

fn artifact_action(op: &str) -> ArtifactAction {
    match op {
        "modified" => ArtifactAction::Modified,
        "deleted" => ArtifactAction::Deleted,
        _ => ArtifactAction::Created,
    }
}

/// Coder handler: an LLM/tool-call loop terminated by a `write` action.
pub struct CoderHandler {
    pool: Arc<EndpointPool>,
}

impl CoderHandler {
    /// Build a handler backed by `pool`.
    #[must_use]
    pub fn new(pool: Arc<EndpointPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AgentHandler for CoderHandler {
    fn role(&self) -> AgentRole {
        AgentRole::Coder
    }

    async fn execute(&self, input: StageInput, cancel: CancellationToken) -> HandlerStream {
        let pool = Arc::clone(&self.pool);
        let deadline = input.deadline;
        let plan_context = input
        .inputs
        .get("plan")
        .map(|v| format!("Plan context:\n{v}\n\n"))
        .unwrap_or_default();

        Box::pin(stream! {
                let mut messages = vec![
                    ChatMessage::system(SYSTEM_PROMPT),
                    ChatMessage::user(format!("{plan_context}Task: {}", input.request.user_message)),
                ];

                for _round in 0..MAX_TOOL_ROUNDS {
                    let mut llm_stream = match pool
                    .chat_stream(&messages, &ChatOptions::default(), deadline, cancel.clone())
                    .await
                    {
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

                    let action: CoderAction = match extract_json(&text).and_then(|v| {
                            serde_json::from_value(v).map_err(|e| HandlerError::InvalidOutput(e.to_string()))
                    }) {
                        Ok(a) => a,
                        Err(e) => {
                            yield HandlerEvent::Done(Err(e));
                            return;
                        }
                    };

                    match action {
                        CoderAction::Write { artifacts } => {
                            let mut output = AgentOutput::new(AgentRole::Coder, "artifacts produced");
                            for spec in artifacts {
                                let artifact = Artifact::new(
                                    spec.relative_path,
                                    spec.content,
                                    artifact_action(&spec.op),
                                );
                                let artifact = match spec.language {
                                    Some(lang) => artifact.with_language(lang),
                                    None => artifact,
                                };
                                yield HandlerEvent::Artifact(artifact.clone());
                                output.artifacts.push(artifact);
                            }
                            yield HandlerEvent::Done(Ok(output));
                            return;
                        }
                        CoderAction::ReadFile { path } => {
                            messages.push(ChatMessage::assistant(text));
                            let (tx, rx) = oneshot::channel();
                            yield HandlerEvent::ToolCallRequest {
                                request: ToolCallRequest {
                                    tool_name: "read_file".to_owned(),
                                    params: serde_json::json!({ "path": path }),
                                },
                                respond: tx,
                            };
                            let result = match rx.await {
                                Ok(Ok(output)) => output,
                                Ok(Err(reason)) => {
                                    yield HandlerEvent::Done(Err(HandlerError::ToolFailed {
                                                tool: "read_file".to_owned(),
                                                reason,
                                    }));
                                    return;
                                }
                                Err(_) => {
                                    yield HandlerEvent::Done(Err(HandlerError::EngineDisconnected));
                                    return;
                                }
                            };
                            messages.push(ChatMessage::user(format!("tool result for read_file({path}):\n{result}")));
                        }
                        CoderAction::ListDirectory { path } => {
                            messages.push(ChatMessage::assistant(text));
                            let (tx, rx) = oneshot::channel();
                            yield HandlerEvent::ToolCallRequest {
                                request: ToolCallRequest {
                                    tool_name: "list_directory".to_owned(),
                                    params: serde_json::json!({ "path": path }),
                                },
                                respond: tx,
                            };
                            let result = match rx.await {
                                Ok(Ok(output)) => output,
                                Ok(Err(reason)) => {
                                    yield HandlerEvent::Done(Err(HandlerError::ToolFailed {
                                                tool: "list_directory".to_owned(),
                                                reason,
                                    }));
                                    return;
                                }
                                Err(_) => {
                                    yield HandlerEvent::Done(Err(HandlerError::EngineDisconnected));
                                    return;
                                }
                            };
                            messages.push(ChatMessage::user(format!("tool result for list_directory({path}):\n{result}")));
                        }
                    }
                }

                yield HandlerEvent::Done(Err(HandlerError::InvalidOutput(
                            "exceeded maximum tool-call rounds without producing artifacts".to_owned(),
                )));
        })
    }
}

