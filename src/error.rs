//! Error types shared by the environments, the task sampler and the meta loop.

use thiserror::Error;

/// Main error type for metaco
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// An action that the current mask reports as infeasible
    #[error("Invalid action {action}: {reason}")]
    InvalidAction { action: usize, reason: String },

    /// Stepping a finished episode or calling the meta loop out of order
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Configuration the framework does not support (fails before construction)
    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    /// Snapshot structure does not match the meta model
    #[error("Parameter mismatch for '{key}': {reason}")]
    ParameterMismatch { key: String, reason: String },

    /// Malformed static problem data
    #[error("Invalid instance: {0}")]
    InvalidInstance(String),

    /// Malformed or out-of-range configuration value
    #[error("Configuration error for {key}: {message}")]
    Config { key: String, message: String },

    /// Tensor backend or data conversion failure
    #[error("Model error: {0}")]
    Model(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for metaco operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Errors that point at a bug in the policy, the masking or the model wiring
    /// rather than at user input.
    pub fn is_logic_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidAction { .. }
                | Error::InvalidTransition(_)
                | Error::ParameterMismatch { .. }
        )
    }

    pub(crate) fn mismatch(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::ParameterMismatch {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            key: key.into(),
            message: message.into(),
        }
    }
}
