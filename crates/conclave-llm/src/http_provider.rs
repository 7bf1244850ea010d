//! OpenAI-compatible streaming provider.
//!
//! Parses an SSE stream into plain text deltas (no tool-call reconstruction),
//! extended with think-tag stripping, a hard deadline, and cooperative
//! cancellation at every chunk boundary.

use std::time::Duration;

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{LlmError, LlmResult};
use crate::provider::{ChatProvider, ChatStream};
use crate::think_tags::{FilteredChunk, ThinkTagFilter};
use crate::types::{ChatChunk, ChatMessage, ChatOptions, ChatRole, Usage};

/// Speaks the OpenAI chat-completions wire format against a single
/// configured endpoint (works against `OpenAI`, LM Studio, vLLM, Ollama's
/// compatibility layer).
pub struct HttpChatProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl HttpChatProvider {
    /// Build a provider for a single endpoint. `api_key` may be `None` for
    /// local endpoints.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
        }
    }

    fn requires_api_key(&self) -> bool {
        self.api_key.as_deref().is_none_or(str::is_empty) && !is_local_url(&self.endpoint)
    }

    fn build_request(&self, messages: &[ChatMessage], options: &ChatOptions) -> Value {
        let wire_messages: Vec<Value> = messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    ChatRole::System => "system",
                    ChatRole::User => "user",
                    ChatRole::Assistant => "assistant",
                };
                serde_json::json!({ "role": role, "content": m.content })
            })
            .collect();

        serde_json::json!({
            "model": self.model,
            "messages": wire_messages,
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
            "stream": true,
        })
    }
}

#[async_trait]
impl ChatProvider for HttpChatProvider {
    fn name(&self) -> &str {
        "openai-compat"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> LlmResult<ChatStream> {
        if self.requires_api_key() {
            return Err(LlmError::ApiKeyNotConfigured { endpoint: self.endpoint.clone() });
        }

        let body = self.build_request(messages, options);
        let mut request = self.client.post(&self.endpoint).header("Content-Type", "application/json");
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        debug!(endpoint = %self.endpoint, model = %self.model, "starting chat stream");

        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed { endpoint: self.endpoint.clone(), reason: e.to_string() })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let endpoint = self.endpoint.clone();
            let response_body = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiStatus { endpoint, status, body: response_body });
        }

        let emit_thinking = options.emit_thinking;
        let deadline_sleep = tokio::time::sleep(deadline);

        let stream = try_stream! {
            tokio::pin!(deadline_sleep);
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();
            let mut filter = ThinkTagFilter::new();

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        Err(LlmError::Cancelled)?;
                    }
                    () = &mut deadline_sleep => {
                        Err(LlmError::DeadlineExceeded)?;
                    }
                    chunk = byte_stream.next() => {
                        let Some(chunk) = chunk else { break };
                        let chunk = chunk.map_err(|e| LlmError::StreamingError(e.to_string()))?;
                        buffer.push_str(&String::from_utf8_lossy(&chunk));

                        while let Some(event_end) = buffer.find("\n\n") {
                            let event = buffer[..event_end].to_owned();
                            buffer = buffer[event_end.saturating_add(2)..].to_owned();

                            for line in event.lines() {
                                let Some(data) = line.strip_prefix("data: ") else { continue };
                                if data.trim() == "[DONE]" {
                                    let drained = std::mem::take(&mut filter);
                                    if let Some(FilteredChunk::Thinking(text)) = drained.finalize() {
                                        if emit_thinking {
                                            yield ChatChunk::ThinkingDelta { text };
                                        }
                                    }
                                    return;
                                }
                                let Ok(event) = serde_json::from_str::<OpenAiStreamEvent>(data) else { continue };
                                if let Some(choice) = event.choices.first() {
                                    if let Some(content) = &choice.delta.content {
                                        if !content.is_empty() {
                                            for piece in filter.process(content) {
                                                match piece {
                                                    FilteredChunk::Visible(text) => yield ChatChunk::Delta { text },
                                                    FilteredChunk::Thinking(text) if emit_thinking => {
                                                        yield ChatChunk::ThinkingDelta { text };
                                                    }
                                                    FilteredChunk::Thinking(_) => {}
                                                }
                                            }
                                        }
                                    }
                                }
                                if let Some(usage) = &event.usage {
                                    yield ChatChunk::Usage(Usage {
                                        prompt_tokens: usage.prompt_tokens,
                                        completion_tokens: usage.completion_tokens,
                                    });
                                }
                            }
                        }
                    }
                }
            }

            if let Some(FilteredChunk::Thinking(text)) = filter.finalize() {
                if emit_thinking {
                    yield ChatChunk::ThinkingDelta { text };
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

impl std::fmt::Debug for HttpChatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpChatProvider")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("has_api_key", &self.api_key.is_some())
            .finish_non_exhaustive()
    }
}

fn is_local_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.contains("localhost") || lower.contains("127.0.0.1") || lower.contains("[::1]")
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamEvent {
    choices: Vec<OpenAiStreamChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiDelta,
}

#[derive(Debug, Deserialize)]
struct OpenAiDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_endpoint_does_not_require_api_key() {
        let provider = HttpChatProvider::new("http://localhost:1234/v1/chat/completions", "local-model", None);
        assert!(!provider.requires_api_key());
    }

    #[test]
    fn remote_endpoint_requires_api_key() {
        let provider = HttpChatProvider::new("https://api.openai.com/v1/chat/completions", "gpt-4", None);
        assert!(provider.requires_api_key());
    }

    #[test]
    fn build_request_includes_stream_flag() {
        let provider = HttpChatProvider::new("http://localhost:1234/v1/chat/completions", "local-model", None);
        let body = provider.build_request(&[ChatMessage::user("hi")], &ChatOptions::default());
        assert_eq!(body["stream"], true);
        assert_eq!(body["model"], "local-model");
    }
}
