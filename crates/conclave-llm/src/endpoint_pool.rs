//! Round-robin endpoint selection with failure cooldown.
//!
//! Uses the same atomic-cursor pattern as `conclave-tools::network::NetworkPolicy`
//! (an `Arc`-shared atomic cell rather than a lock around a plain counter),
//! generalized from a single flag to a rotating index.

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures::Stream;
use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{LlmError, LlmResult};
use crate::provider::{ChatProvider, ChatStream};
use crate::types::{ChatMessage, ChatOptions};

/// Matches typical local-model servers, which serialize or badly degrade
/// under more than a couple of concurrent requests.
const DEFAULT_MAX_CONCURRENT_PER_ENDPOINT: usize = 2;

struct Endpoint {
    provider: Box<dyn ChatProvider>,
    last_failure: RwLock<Option<Instant>>,
    in_flight: Arc<Semaphore>,
}

/// Wraps a provider's stream so the endpoint's in-flight permit is held for
/// the stream's entire lifetime, not just while the initial call is made:
/// the permit is released when the stream is dropped, whether drained to
/// completion or abandoned early on cancellation.
struct PermitGuardedStream {
    inner: ChatStream,
    _permit: OwnedSemaphorePermit,
}

impl Stream for PermitGuardedStream {
    type Item = LlmResult<crate::types::ChatChunk>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        this.inner.as_mut().poll_next(cx)
    }
}

/// A pool of chat providers tried in round-robin order. An endpoint that
/// fails is skipped for `cooldown` after the failure, so a flaky endpoint
/// does not eat every other request while it recovers. Each endpoint also
/// bounds its own in-flight request count via a semaphore, so one busy
/// endpoint cannot starve the others sharing the pool's round-robin cursor.
pub struct EndpointPool {
    endpoints: Vec<Endpoint>,
    cursor: AtomicUsize,
    cooldown: Duration,
}

impl EndpointPool {
    /// Build a pool from at least one provider, capping each endpoint's
    /// concurrent in-flight requests at the default of 2.
    #[must_use]
    pub fn new(providers: Vec<Box<dyn ChatProvider>>, cooldown: Duration) -> Self {
        Self::with_max_concurrent_per_endpoint(providers, cooldown, DEFAULT_MAX_CONCURRENT_PER_ENDPOINT)
    }

    /// Build a pool, capping each endpoint's concurrent in-flight requests
    /// at `max_concurrent_per_endpoint` (clamped to at least one, so a
    /// misconfigured `0` does not deadlock every request forever).
    #[must_use]
    pub fn with_max_concurrent_per_endpoint(
        providers: Vec<Box<dyn ChatProvider>>,
        cooldown: Duration,
        max_concurrent_per_endpoint: usize,
    ) -> Self {
        let permits = max_concurrent_per_endpoint.max(1);
        let endpoints = providers
            .into_iter()
            .map(|provider| Endpoint {
                provider,
                last_failure: RwLock::new(None),
                in_flight: Arc::new(Semaphore::new(permits)),
            })
            .collect();
        Self { endpoints, cursor: AtomicUsize::new(0), cooldown }
    }

    /// Number of endpoints in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Whether the pool has no endpoints configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Try a `chat_stream` call against endpoints in round-robin order,
    /// skipping any still within their cooldown window. Returns the first
    /// successfully established stream; the stream itself still surfaces
    /// mid-stream errors to the caller unchanged.
    pub async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> LlmResult<ChatStream> {
        if self.endpoints.is_empty() {
            return Err(LlmError::AllEndpointsCoolingDown(0));
        }

        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % self.endpoints.len();
        let mut last_err = None;

        for offset in 0..self.endpoints.len() {
            let idx = (start + offset) % self.endpoints.len();
            let endpoint = &self.endpoints[idx];

            if self.is_cooling_down(endpoint).await {
                continue;
            }

            let permit = Arc::clone(&endpoint.in_flight)
                .acquire_owned()
                .await
                .expect("endpoint semaphore is never closed");

            match endpoint.provider.chat_stream(messages, options, deadline, cancel.clone()).await {
                Ok(stream) => {
                    let guarded: ChatStream = Box::pin(PermitGuardedStream { inner: stream, _permit: permit });
                    return Ok(guarded);
                }
                Err(err) => {
                    drop(permit);
                    warn!(endpoint = endpoint.provider.name(), error = %err, "endpoint failed, marking cooldown");
                    *endpoint.last_failure.write().await = Some(Instant::now());
                    last_err = Some(err);
                }
            }
        }

        match last_err {
            Some(err) => Err(err),
            None => Err(LlmError::AllEndpointsCoolingDown(self.endpoints.len())),
        }
    }

    async fn is_cooling_down(&self, endpoint: &Endpoint) -> bool {
        match *endpoint.last_failure.read().await {
            Some(at) => at.elapsed() < self.cooldown,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatChunk;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    struct FlakyProvider {
        name: &'static str,
        fail_count: AtomicU32,
    }

    #[async_trait]
    impl ChatProvider for FlakyProvider {
        fn name(&self) -> &str {
            self.name
        }

        fn model(&self) -> &str {
            "test-model"
        }

        async fn chat_stream(
            &self,
            _messages: &[ChatMessage],
            _options: &ChatOptions,
            _deadline: Duration,
            _cancel: CancellationToken,
        ) -> LlmResult<ChatStream> {
            if self.fail_count.fetch_add(1, Ordering::Relaxed) == 0 {
                return Err(LlmError::RequestFailed { endpoint: self.name.to_owned(), reason: "boom".into() });
            }
            let items = vec![Ok(ChatChunk::Delta { text: "ok".into() })];
            Ok(Box::pin(futures::stream::iter(items)))
        }
    }

    #[tokio::test]
    async fn falls_through_to_the_next_endpoint_on_failure() {
        let pool = EndpointPool::new(
            vec![
                Box::new(FlakyProvider { name: "a", fail_count: AtomicU32::new(0) }),
                Box::new(FlakyProvider { name: "b", fail_count: AtomicU32::new(0) }),
            ],
            Duration::from_secs(30),
        );

        let result = pool
            .chat_stream(&[ChatMessage::user("hi")], &ChatOptions::default(), Duration::from_secs(5), CancellationToken::new())
            .await;
        assert!(result.is_ok());
    }

    struct SlowProvider {
        current: Arc<AtomicU32>,
        peak: Arc<AtomicU32>,
    }

    #[async_trait]
    impl ChatProvider for SlowProvider {
        fn name(&self) -> &str {
            "slow"
        }

        fn model(&self) -> &str {
            "test-model"
        }

        async fn chat_stream(
            &self,
            _messages: &[ChatMessage],
            _options: &ChatOptions,
            _deadline: Duration,
            _cancel: CancellationToken,
        ) -> LlmResult<ChatStream> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(Box::pin(futures::stream::iter(Vec::new())))
        }
    }

    #[tokio::test]
    async fn concurrent_requests_to_one_endpoint_are_capped() {
        let current = Arc::new(AtomicU32::new(0));
        let peak = Arc::new(AtomicU32::new(0));
        let pool = Arc::new(EndpointPool::with_max_concurrent_per_endpoint(
            vec![Box::new(SlowProvider { current: Arc::clone(&current), peak: Arc::clone(&peak) })],
            Duration::from_secs(30),
            2,
        ));

        let mut calls = Vec::new();
        for _ in 0..5 {
            let pool = Arc::clone(&pool);
            calls.push(tokio::spawn(async move {
                pool.chat_stream(&[ChatMessage::user("hi")], &ChatOptions::default(), Duration::from_secs(5), CancellationToken::new())
                    .await
            }));
        }
        for call in calls {
            assert!(call.await.unwrap().is_ok());
        }

        assert!(peak.load(Ordering::SeqCst) <= 2, "peak concurrency exceeded the per-endpoint cap");
    }

    #[tokio::test]
    async fn empty_pool_errors_immediately() {
        let pool = EndpointPool::new(Vec::new(), Duration::from_secs(30));
        let result = pool
            .chat_stream(&[], &ChatOptions::default(), Duration::from_secs(5), CancellationToken::new())
            .await;
        assert!(matches!(result, Err(LlmError::AllEndpointsCoolingDown(0))));
    }
}
