//! Request/response types for the chat streaming interface.
//!
//! Covers the single `chat_stream` shape: plain role/content turns in, a
//! stream of text deltas and a final usage tally out. Tool-call plumbing
//! belongs to the agent handlers (C4), not this adapter.

use serde::{Deserialize, Serialize};

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    /// System/instruction turn.
    System,
    /// End-user turn.
    User,
    /// Prior model turn, fed back for multi-turn context.
    Assistant,
}

/// One turn of conversation sent to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who spoke this turn.
    pub role: ChatRole,
    /// Turn content, plain text.
    pub content: String,
}

impl ChatMessage {
    /// Build a system turn.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    /// Build a user turn.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    /// Build an assistant turn.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

/// Per-call sampling and limit overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatOptions {
    /// Sampling temperature.
    pub temperature: f64,
    /// Maximum tokens the provider should generate.
    pub max_tokens: usize,
    /// Whether to surface a `thinking_delta` side-channel for stripped
    /// `<think>` content, for UI debug toggles.
    pub emit_thinking: bool,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self { temperature: 0.7, max_tokens: 4096, emit_thinking: false }
    }
}

/// Normalized token usage, reported once at stream end.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt.
    pub prompt_tokens: usize,
    /// Tokens generated in the response.
    pub completion_tokens: usize,
}

impl Usage {
    /// Total tokens billed for the call.
    #[must_use]
    pub fn total(&self) -> usize {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// One item in a chat stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChatChunk {
    /// Visible text, with any `<think>` content already stripped.
    Delta {
        /// Text to append to the visible response.
        text: String,
    },
    /// Content that was inside a `<think>` tag, surfaced only when
    /// [`ChatOptions::emit_thinking`] was set.
    ThinkingDelta {
        /// Reasoning text.
        text: String,
    },
    /// Final usage tally. Always the last item before the stream ends,
    /// when the provider reports usage at all.
    Usage(Usage),
}
