//! # Error Types
//!
//! Custom error types for the vehicle supervisor using `thiserror`.
//!
//! Only setup-time failures surface here. Per-cycle faults inside workers
//! (transport hiccups, fusion timeouts) are logged and never propagated.

use std::time::Duration;
use thiserror::Error;

/// Main error type for the vehicle supervisor
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Invalid configuration value, worker count or missing pool argument
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Logger could not be initialised
    #[error("Logging error: {0}")]
    Logging(String),

    /// The vehicle never announced itself on the link
    #[error("No peer heartbeat within {0:?}")]
    PeerNotFound(Duration),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the vehicle supervisor
pub type Result<T> = std::result::Result<T, SupervisorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_message() {
        let err = SupervisorError::Config("worker count must be greater than 0".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: worker count must be greater than 0"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: SupervisorError = io.into();
        assert!(matches!(err, SupervisorError::Io(_)));
    }

    #[test]
    fn test_peer_not_found_message() {
        let err = SupervisorError::PeerNotFound(Duration::from_secs(30));
        assert!(err.to_string().contains("30s"));
    }
}
