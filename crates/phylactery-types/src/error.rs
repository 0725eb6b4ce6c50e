//! Shared error types for the Phylactery system.

use thiserror::Error;

/// Top-level error type for the Phylactery system.
#[derive(Error, Debug)]
pub enum PhylacteryError {
    /// The key-value backend failed to read or write.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Invalid user input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<serde_json::Error> for PhylacteryError {
    fn from(e: serde_json::Error) -> Self {
        PhylacteryError::Serialization(e.to_string())
    }
}

/// Alias for Result with PhylacteryError.
pub type PhylacteryResult<T> = Result<T, PhylacteryError>;
