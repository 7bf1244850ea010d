//! Streaming chat adapter (C3).
//!
//! A single entry point — [`EndpointPool::chat_stream`] — fronting one or
//! more OpenAI-compatible endpoints. Think-tag stripping, usage
//! normalization, and cancellation live in this crate; model/provider
//! selection lives in `conclave-config`.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod endpoint_pool;
mod error;
mod http_provider;
mod provider;
mod think_tags;
mod types;

pub use endpoint_pool::EndpointPool;
pub use error::{LlmError, LlmResult};
pub use http_provider::HttpChatProvider;
pub use provider::{ChatProvider, ChatStream};
pub use think_tags::{FilteredChunk, ThinkTagFilter};
pub use types::{ChatChunk, ChatMessage, ChatOptions, ChatRole, Usage};

use std::time::Duration;

use conclave_config::LlmSection;

/// Build an [`EndpointPool`] from the configured `LlmSection`: the primary
/// `endpoint` plus every entry in `extra_endpoints`, all sharing the same
/// model and API key, gated by `endpoint_cooldown_secs` and capped per
/// endpoint at `max_concurrent_requests_per_endpoint`.
#[must_use]
pub fn pool_from_config(section: &LlmSection) -> EndpointPool {
    let mut providers: Vec<Box<dyn ChatProvider>> = Vec::with_capacity(1 + section.extra_endpoints.len());
    providers.push(Box::new(HttpChatProvider::new(
        section.endpoint.clone(),
        section.model.clone(),
        section.api_key.clone(),
    )));
    for endpoint in &section.extra_endpoints {
        providers.push(Box::new(HttpChatProvider::new(
            endpoint.clone(),
            section.model.clone(),
            section.api_key.clone(),
        )));
    }
    EndpointPool::with_max_concurrent_per_endpoint(
        providers,
        Duration::from_secs(section.endpoint_cooldown_secs),
        section.max_concurrent_requests_per_endpoint,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_from_config_includes_primary_and_extra_endpoints() {
        let mut section = LlmSection::default();
        section.extra_endpoints = vec!["https://backup.example.com/v1/chat/completions".to_owned()];
        let pool = pool_from_config(&section);
        assert_eq!(pool.len(), 2);
    }
}
