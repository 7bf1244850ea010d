//! Process-wide network-mode policy.
//!
//! A single atomic cell, checked from two call sites — `ToolRegistry::get`
//! and `ToolExecutor::invoke` — with the second check authoritative. Uses a
//! single-source-of-truth idiom: one free function every enforcement point
//! calls, rather than each caller maintaining its own inline check.

use crate::NetworkType;
use std::sync::atomic::{AtomicU8, Ordering};

const ONLINE: u8 = 0;
const OFFLINE: u8 = 1;

/// Process-wide network mode gating `external_api` tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkMode {
    /// All network types are permitted.
    Online,
    /// `ExternalApi` tools are unavailable. `ExternalDownload` remains
    /// available (one-way ingress does not exfiltrate local data).
    Offline,
}

impl std::fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// A shared, atomically readable/writable network-mode cell.
///
/// Cheap to clone: internally an `Arc<AtomicU8>`.
#[derive(Clone)]
pub struct NetworkPolicy {
    cell: std::sync::Arc<AtomicU8>,
}

impl NetworkPolicy {
    /// Construct a policy starting in the given mode.
    #[must_use]
    pub fn new(mode: NetworkMode) -> Self {
        let initial = match mode {
            NetworkMode::Online => ONLINE,
            NetworkMode::Offline => OFFLINE,
        };
        Self {
            cell: std::sync::Arc::new(AtomicU8::new(initial)),
        }
    }

    /// Read the current mode.
    #[must_use]
    pub fn mode(&self) -> NetworkMode {
        if self.cell.load(Ordering::SeqCst) == OFFLINE {
            NetworkMode::Offline
        } else {
            NetworkMode::Online
        }
    }

    /// Flip the mode at runtime (e.g. via an admin API), logged by the caller.
    pub fn set_mode(&self, mode: NetworkMode) {
        let value = match mode {
            NetworkMode::Online => ONLINE,
            NetworkMode::Offline => OFFLINE,
        };
        self.cell.store(value, Ordering::SeqCst);
    }

    /// Whether a tool of the given network type may run right now.
    #[must_use]
    pub fn allows(&self, network_type: NetworkType) -> bool {
        match (self.mode(), network_type) {
            (NetworkMode::Offline, NetworkType::ExternalApi) => false,
            _ => true,
        }
    }
}

impl Default for NetworkPolicy {
    fn default() -> Self {
        Self::new(NetworkMode::Online)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_blocks_external_api_but_allows_download() {
        let policy = NetworkPolicy::new(NetworkMode::Offline);
        assert!(!policy.allows(NetworkType::ExternalApi));
        assert!(policy.allows(NetworkType::ExternalDownload));
        assert!(policy.allows(NetworkType::Local));
    }

    #[test]
    fn online_allows_everything() {
        let policy = NetworkPolicy::new(NetworkMode::Online);
        assert!(policy.allows(NetworkType::ExternalApi));
        assert!(policy.allows(NetworkType::ExternalDownload));
    }

    #[test]
    fn set_mode_takes_effect_immediately() {
        let policy = NetworkPolicy::default();
        assert!(policy.allows(NetworkType::ExternalApi));
        policy.set_mode(NetworkMode::Offline);
        assert!(!policy.allows(NetworkType::ExternalApi));
    }
}

