//! Environment variable fallback resolution.
//!
//! Reads the recognized env vars directly into a [`Config`](crate::types::Config),
//! consolidating what would otherwise be scattered flags into one typed struct.

use crate::error::{ConfigError, ConfigResult};
use crate::types::{Config, NetworkModeConfig};

/// Apply env var overrides on top of [`Config::default`].
///
/// # Errors
///
/// Returns [`ConfigError::InvalidEnvVar`] if a set variable cannot be parsed
/// into its expected type (e.g. `MAX_PARALLEL_AGENTS` is not a valid `usize`).
pub fn apply_env(config: &mut Config) -> ConfigResult<()> {
    if let Ok(mode) = std::env::var("NETWORK_MODE") {
        config.network.mode = match mode.to_ascii_lowercase().as_str() {
            "online" => NetworkModeConfig::Online,
            "offline" => NetworkModeConfig::Offline,
            other => {
                return Err(ConfigError::InvalidEnvVar {
                    var: "NETWORK_MODE".to_owned(),
                    message: format!("expected 'online' or 'offline', got '{other}'"),
                });
            },
        };
    }

    if let Ok(endpoint) = std::env::var("LLM_ENDPOINT") {
        config.llm.endpoint = endpoint;
    }
    if let Ok(model) = std::env::var("LLM_MODEL") {
        config.llm.model = model;
    }
    if let Ok(key) = std::env::var("LLM_API_KEY") {
        config.llm.api_key = Some(key);
    }
    if let Ok(endpoints) = std::env::var("LLM_ENDPOINTS") {
        config.llm.extra_endpoints = endpoints
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned)
            .collect();
    }

    if let Ok(root) = std::env::var("DEFAULT_WORKSPACE") {
        config.workspace.default_workspace = root;
    }

    if let Ok(raw) = std::env::var("MAX_PARALLEL_AGENTS") {
        config.engine.max_parallel_stages =
            raw.parse().map_err(|_| ConfigError::InvalidEnvVar {
                var: "MAX_PARALLEL_AGENTS".to_owned(),
                message: format!("expected a positive integer, got '{raw}'"),
            })?;
    }

    if let Ok(raw) = std::env::var("ENABLE_DYNAMIC_HITL") {
        config.hitl.enable_dynamic_hitl = parse_bool("ENABLE_DYNAMIC_HITL", &raw)?;
    }
    if let Ok(raw) = std::env::var("ENABLE_PAUSE_BUTTON") {
        config.hitl.enable_pause_button = parse_bool("ENABLE_PAUSE_BUTTON", &raw)?;
    }

    if let Ok(raw) = std::env::var("CONCLAVE_LOG") {
        config.logging.filter = raw;
    }
    if let Ok(raw) = std::env::var("CONCLAVE_BIND_ADDR") {
        config.server.bind_addr = raw;
    }
    if let Ok(raw) = std::env::var("CONCLAVE_DATA_ROOT") {
        config.server.data_root = raw;
    }

    Ok(())
}

fn parse_bool(var: &str, raw: &str) -> ConfigResult<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar {
            var: var.to_owned(),
            message: format!("expected a boolean, got '{other}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env var mutation races across tests in the same process; serialize them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn network_mode_env_var_overrides_default() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("NETWORK_MODE", "offline");
        let mut config = Config::default();
        apply_env(&mut config).unwrap();
        assert_eq!(config.network.mode, NetworkModeConfig::Offline);
        std::env::remove_var("NETWORK_MODE");
    }

    #[test]
    fn invalid_network_mode_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("NETWORK_MODE", "sideways");
        let mut config = Config::default();
        assert!(apply_env(&mut config).is_err());
        std::env::remove_var("NETWORK_MODE");
    }

    #[test]
    fn llm_endpoints_csv_is_split_and_trimmed() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("LLM_ENDPOINTS", "https://a.example, https://b.example");
        let mut config = Config::default();
        apply_env(&mut config).unwrap();
        assert_eq!(
            config.llm.extra_endpoints,
            vec!["https://a.example", "https://b.example"]
        );
        std::env::remove_var("LLM_ENDPOINTS");
    }
}
