//! Error types for the screenwatch service.

use thiserror::Error;

/// Result type alias using the screenwatch error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type returned by caller-facing operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed request (bad ticker, out-of-range limit)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// External data provider failed
    #[error("Provider error: {0}")]
    Provider(String),

    /// Persistence collaborator failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// A scheduler iteration failed outside the screening pipeline
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Check if this is a validation failure.
    pub const fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }

    /// Get HTTP status code for this error.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput(_) => 400,
            Self::Provider(_) => 502,
            _ => 500,
        }
    }
}
