//! QA Gate: dispatches `run_tests` through the engine's tool
//! interception (no LLM turn) and reports pass/fail. Reuses the tool-call
//! suspension half of [`crate::roles::coder`], stripped down to a
//! single non-looping dispatch.

use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use conclave_core::agent_output::ToolCallRequest;
use conclave_core::plan::AgentRole;
use conclave_core::AgentOutput;
use serde::Deserialize;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::HandlerError;
use crate::handler::AgentHandler;
use crate::types::{HandlerEvent, HandlerStream, StageInput};

#[derive(Deserialize, Default)]
struct RunTestsOutput {
    #[serde(default)]
    passed: bool,
    #[serde(default)]
    failures: Vec<String>,
}

/// QA Gate handler: runs the workspace test suite via the `run_tests` tool.
pub struct QaGateHandler;

impl QaGateHandler {
    /// Construct the handler. Stateless: it owns no LLM pool.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for QaGateHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentHandler for QaGateHandler {
    fn role(&self) -> AgentRole {
        AgentRole::QaGate
    }

    async fn execute(&self, _input: StageInput, _cancel: CancellationToken) -> HandlerStream {
        Box::pin(stream! {
                let (tx, rx) = oneshot::channel();
                yield HandlerEvent::ToolCallRequest {
                    request: ToolCallRequest {
                        tool_name: "run_tests".to_owned(),
                        params: serde_json::json!({}),
                    },
                    respond: tx,
                };

                let raw = match rx.await {
                    Ok(Ok(output)) => output,
                    Ok(Err(reason)) => {
                        yield HandlerEvent::Done(Err(HandlerError::ToolFailed {
                                    tool: "run_tests".to_owned(),
                                    reason,
                        }));
                        return;
                    }
                    Err(_) => {
                        yield HandlerEvent::Done(Err(HandlerError::EngineDisconnected));
                        return;
                    }
                };

                let parsed: RunTestsOutput = serde_json::from_str(&raw).unwrap_or(RunTestsOutput {
                        passed: false,
                        failures: vec![format!("could not parse run_tests output: {raw}")],
                });

                let mut output = AgentOutput::new(
                    AgentRole::QaGate,
                    if parsed.passed { "tests passed" } else { "tests failed" },
                );
                output.needs_refine = !parsed.passed;
                output.issues = parsed.failures;
                yield HandlerEvent::Done(Ok(output));
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_role_qa_gate() {
        assert_eq!(QaGateHandler::new().role(), AgentRole::QaGate);
    }
}

