#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Unified configuration for the Conclave orchestration runtime.
//!
//! Consolidates the env-var-driven knobs (`NETWORK_MODE`, `LLM_ENDPOINT`,
//! `LLM_MODEL`, `LLM_API_KEY`, `LLM_ENDPOINTS`, `DEFAULT_WORKSPACE`,
//! `MAX_PARALLEL_AGENTS`, `ENABLE_DYNAMIC_HITL`, `ENABLE_PAUSE_BUTTON`) into
//! one typed [`Config`], read once at process startup.
//!
//! # Design
//!
//! This crate has no dependencies on other internal conclave crates. It
//! only depends on `serde`, `thiserror`, and `tracing` — this runtime has
//! no per-workspace config file concept, so only the env-var layer and
//! embedded defaults apply; there is no multi-file TOML layering.

/// Environment variable fallback resolution.
pub mod env;
/// Configuration error types.
pub mod error;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use types::*;

impl Config {
    /// Build a configuration from embedded defaults overridden by
    /// environment variables, then validate it.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if an env var holds an unparsable value or
    /// the resulting configuration fails validation.
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = Self::default();
        env::apply_env(&mut config)?;
        validate::validate(&config)?;
        tracing::info!(
            max_parallel_stages = config.engine.max_parallel_stages,
            network_mode = ?config.network.mode,
            "configuration loaded"
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_loads_without_env_overrides() {
        let config = Config::default();
        assert!(validate::validate(&config).is_ok());
    }
}
