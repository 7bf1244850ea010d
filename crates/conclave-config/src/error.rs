//! Configuration error types.

use thiserror::Error;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held a value that could not be parsed into
    /// the expected type.
    #[error("environment variable {var} has an invalid value: {message}")]
    InvalidEnvVar {
        /// The offending variable name.
        var: String,
        /// What went wrong.
        message: String,
    },
    /// A fully merged configuration failed a cross-field or range check.
    #[error("invalid configuration for {field}: {message}")]
    Validation {
        /// Dotted field path, e.g. `engine.max_parallel_stages`.
        field: String,
        /// What went wrong.
        message: String,
    },
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;
