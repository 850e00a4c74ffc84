//! Error types for Engram

use thiserror::Error;

/// Main error type for memory operations
#[derive(Error, Debug)]
pub enum MemoryError {
    /// The embedding provider could not be brought up on first use
    #[error("Initialization error: {0}")]
    Initialization(String),

    /// An embedding call failed or produced a vector of the wrong shape
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Storage-related errors (LanceDB, file system, etc.)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Malformed caller input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for MemoryError {
    fn from(e: serde_json::Error) -> Self {
        MemoryError::Serialization(e.to_string())
    }
}

/// Result type alias for memory operations
pub type Result<T> = std::result::Result<T, MemoryError>;
