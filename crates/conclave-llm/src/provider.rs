//! The single-method chat provider trait.
//!
//! Exposes the one operation this system needs: a cancellable, deadline-bound
//! streaming chat call, behind a pinned trait-object stream alias.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use tokio_util::sync::CancellationToken;

use crate::error::LlmResult;
use crate::types::{ChatMessage, ChatOptions};

/// A boxed, pinned stream of chat chunks.
pub type ChatStream = Pin<Box<dyn Stream<Item = LlmResult<crate::types::ChatChunk>> + Send>>;

/// A provider capable of streaming a chat completion.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Human-readable provider name, for logging.
    fn name(&self) -> &str;

    /// Model identifier sent with each request.
    fn model(&self) -> &str;

    /// Stream a completion for `messages`. The stream must stop emitting
    /// items as soon as `cancel` fires or `deadline` elapses, yielding an
    /// `Err(LlmError::Cancelled)` / `Err(LlmError::DeadlineExceeded)` as its
    /// final item in those cases.
    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> LlmResult<ChatStream>;
}

#[async_trait]
impl ChatProvider for Box<dyn ChatProvider> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn model(&self) -> &str {
        (**self).model()
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> LlmResult<ChatStream> {
        (**self).chat_stream(messages, options, deadline, cancel).await
    }
}
