//! Error types for the state store.

use thiserror::Error;

/// Main error type for store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Store has been destroyed")]
    Destroyed,

    #[error("Fetch failed at {path}: {message}")]
    Fetch { path: String, message: String },

    #[error("Async operation at {path} was cancelled")]
    Cancelled { path: String },

    #[error("Cannot descend into non-container value at {path}")]
    NotAContainer { path: String },

    #[error("Index {index} is past the end of the array at {path} (length {len})")]
    IndexOutOfBounds { path: String, index: usize, len: usize },

    #[error("Invalid subscription pattern: {0}")]
    InvalidPattern(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl StoreError {
    /// Whether this error came from a fetcher rather than the store itself.
    pub fn is_fetch(&self) -> bool {
        matches!(self, StoreError::Fetch { .. })
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
