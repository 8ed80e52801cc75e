//! Error types for the Affinity matching core
//!
//! Validation and lookup failures are surfaced to the caller as structured
//! variants (thiserror); binaries propagate them with anyhow.

use thiserror::Error;

/// Main error type for Affinity operations
#[derive(Error, Debug)]
pub enum AffinityError {
    /// Input rejected: out-of-range score, weights not summing to 1.0,
    /// unknown scene, insufficient A/B sample size, illegal state transition
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown profile, match, feedback, adjustment or test
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl AffinityError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AffinityError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AffinityError::NotFound(msg.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, AffinityError::Validation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AffinityError::NotFound(_))
    }
}

/// Result type alias for Affinity operations
pub type Result<T> = std::result::Result<T, AffinityError>;

/// Convert anyhow::Error to AffinityError
impl From<anyhow::Error> for AffinityError {
    fn from(err: anyhow::Error) -> Self {
        AffinityError::Other(err.to_string())
    }
}
