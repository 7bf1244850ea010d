//! Mock implementations for testing.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use conclave_llm::{ChatChunk, ChatMessage, ChatOptions, ChatProvider, ChatStream, LlmError, LlmResult};
use futures::stream;
use tokio_util::sync::CancellationToken;

/// A [`ChatProvider`] that replays a queue of canned full-text replies.
///
/// Each queued reply is yielded as a single [`ChatChunk::Delta`] followed by
/// a zero-valued [`ChatChunk::Usage`], mirroring the shape a real provider
/// produces at stream end. Replies are consumed in FIFO order; once the
/// queue is drained, every further call returns [`LlmError::ProviderError`].
#[derive(Debug, Clone)]
pub struct MockChatProvider {
    name: String,
    model: String,
    replies: Arc<Mutex<VecDeque<String>>>,
    captured_calls: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
}

impl MockChatProvider {
    /// Construct a provider with no queued replies.
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: "mock".to_owned(),
            model: "mock-model".to_owned(),
            replies: Arc::new(Mutex::new(VecDeque::new())),
            captured_calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a reply, returned whole on the next `chat_stream` call.
    #[must_use]
    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        if let Ok(mut guard) = self.replies.lock() {
            guard.push_back(reply.into());
        }
        self
    }

    /// Queue several replies at once, in order.
    #[must_use]
    pub fn with_replies(self, replies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        if let Ok(mut guard) = self.replies.lock() {
            guard.extend(replies.into_iter().map(Into::into));
        }
        self
    }

    /// Every message list this provider was called with, in call order.
    #[must_use]
    pub fn captured_calls(&self) -> Vec<Vec<ChatMessage>> {
        self.captured_calls.lock().map(|g| g.clone()).unwrap_or_default()
    }

    fn clone_messages(messages: &[ChatMessage]) -> Vec<ChatMessage> {
        messages.to_vec()
    }
}

impl Default for MockChatProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatProvider for MockChatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        _options: &ChatOptions,
        _deadline: Duration,
        _cancel: CancellationToken,
    ) -> LlmResult<ChatStream> {
        if let Ok(mut guard) = self.captured_calls.lock() {
            guard.push(Self::clone_messages(messages));
        }

        let reply = self
            .replies
            .lock()
            .ok()
            .and_then(|mut g| g.pop_front())
            .ok_or_else(|| LlmError::ProviderError("MockChatProvider: reply queue exhausted".to_owned()))?;

        let chunks: Vec<LlmResult<ChatChunk>> = vec![
            Ok(ChatChunk::Delta { text: reply }),
            Ok(ChatChunk::Usage(conclave_llm::Usage::default())),
        ];
        let boxed: ChatStream = Box::pin(stream::iter(chunks));
        Ok(boxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_queued_reply_as_a_single_delta() {
        use futures::StreamExt;

        let provider = MockChatProvider::new().with_reply("hello");
        let mut s = provider
            .chat_stream(&[ChatMessage::user("hi")], &ChatOptions::default(), Duration::from_secs(5), CancellationToken::new())
            .await
            .unwrap();

        let first = s.next().await.unwrap().unwrap();
        assert!(matches!(first, ChatChunk::Delta { text } if text == "hello"));
    }

    #[tokio::test]
    async fn exhausted_queue_errors() {
        let provider = MockChatProvider::new();
        let result = provider
            .chat_stream(&[ChatMessage::user("hi")], &ChatOptions::default(), Duration::from_secs(5), CancellationToken::new())
            .await;
        assert!(result.is_err());
    }
}
