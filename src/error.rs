//! # Crate-Level Error Types
//!
//! Top-level error enum that every subsystem error converts into, plus the
//! crate-wide `Result` alias re-exported from the crate root.

use thiserror::Error;

use crate::config::ConfigurationError;
use crate::messaging::MessagingError;
use crate::resilience::PolicyError;

/// Top-level error for switchboard operations
#[derive(Debug, Error)]
pub enum SwitchboardError {
    #[error("Resilience policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Health reporting error: {0}")]
    Health(String),
}

impl SwitchboardError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

impl From<ConfigurationError> for SwitchboardError {
    fn from(err: ConfigurationError) -> Self {
        Self::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SwitchboardError>;
