//! Small helpers shared by every LLM-backed handler: message construction
//! and tolerant JSON extraction from a model's free-text reply.

use conclave_llm::{ChatMessage, LlmError};
use serde_json::Value;

use crate::error::{HandlerError, HandlerResult};

impl From<LlmError> for HandlerError {
    fn from(e: LlmError) -> Self {
        Self::Llm(e)
    }
}

/// Build the `[system, user]` message pair every role-specific handler sends.
#[must_use]
pub(crate) fn turn_messages(system_prompt: &str, user_content: &str) -> Vec<ChatMessage> {
    vec![ChatMessage::system(system_prompt), ChatMessage::user(user_content)]
}

/// Extract the first JSON object/array in `text`, tolerating a surrounding
/// markdown code fence (` ```json ... ``` `) the way reasoning models
/// routinely wrap structured replies.
pub(crate) fn extract_json(text: &str) -> HandlerResult<Value> {
    let trimmed = text.trim();
    let candidate = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(str::trim_start)
        .and_then(|s| s.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed);

    serde_json::from_str(candidate)
        .map_err(|e| HandlerError::InvalidOutput(format!("could not parse JSON response: {e}")))
}
