//! Error types for the throttling subsystem.

use thiserror::Error;

/// Main error type for throttle operations.
///
/// Rate limit checks themselves never fail; these errors only surface while
/// building policies or loading configuration.
#[derive(Error, Debug)]
pub enum ThrottleError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A policy was constructed with a zero quota, zero window or empty namespace
    #[error("Invalid rate limit policy: {0}")]
    InvalidPolicy(String),
}

impl From<config::ConfigError> for ThrottleError {
    fn from(err: config::ConfigError) -> Self {
        ThrottleError::Config(err.to_string())
    }
}

/// Result type alias for throttle operations.
pub type Result<T> = std::result::Result<T, ThrottleError>;
