//! Post-merge configuration validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Validate a fully assembled configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_engine(config)?;
    validate_llm(config)?;
    validate_server(config)?;
    Ok(())
}

fn validate_engine(config: &Config) -> ConfigResult<()> {
    let e = &config.engine;

    if e.max_parallel_stages == 0 {
        return Err(ConfigError::Validation {
            field: "engine.max_parallel_stages".to_owned(),
            message: "must be at least 1".to_owned(),
        });
    }
    if e.max_active_workflows == 0 {
        return Err(ConfigError::Validation {
            field: "engine.max_active_workflows".to_owned(),
            message: "must be at least 1".to_owned(),
        });
    }
    if e.default_stage_timeout_secs == 0 {
        return Err(ConfigError::Validation {
            field: "engine.default_stage_timeout_secs".to_owned(),
            message: "must be at least 1 second".to_owned(),
        });
    }
    if e.workflow_deadline_secs == 0 {
        return Err(ConfigError::Validation {
            field: "engine.workflow_deadline_secs".to_owned(),
            message: "must be at least 1 second".to_owned(),
        });
    }
    if e.max_context_entries == 0 {
        return Err(ConfigError::Validation {
            field: "engine.max_context_entries".to_owned(),
            message: "must be at least 1".to_owned(),
        });
    }
    Ok(())
}

fn validate_llm(config: &Config) -> ConfigResult<()> {
    if config.llm.endpoint.is_empty() {
        return Err(ConfigError::Validation {
            field: "llm.endpoint".to_owned(),
            message: "must not be empty".to_owned(),
        });
    }
    if config.llm.model.is_empty() {
        return Err(ConfigError::Validation {
            field: "llm.model".to_owned(),
            message: "must not be empty".to_owned(),
        });
    }
    if config.llm.max_concurrent_requests_per_endpoint == 0 {
        return Err(ConfigError::Validation {
            field: "llm.max_concurrent_requests_per_endpoint".to_owned(),
            message: "must be at least 1".to_owned(),
        });
    }
    Ok(())
}

fn validate_server(config: &Config) -> ConfigResult<()> {
    if config.server.bind_addr.parse::<std::net::SocketAddr>().is_err() {
        return Err(ConfigError::Validation {
            field: "server.bind_addr".to_owned(),
            message: format!("'{}' is not a valid socket address", config.server.bind_addr),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn zero_max_parallel_stages_is_rejected() {
        let mut config = Config::default();
        config.engine.max_parallel_stages = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn empty_llm_endpoint_is_rejected() {
        let mut config = Config::default();
        config.llm.endpoint.clear();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn malformed_bind_addr_is_rejected() {
        let mut config = Config::default();
        config.server.bind_addr = "not-an-address".to_owned();
        assert!(validate(&config).is_err());
    }
}
