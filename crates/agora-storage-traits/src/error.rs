//! Error types for Agora storage operations

use thiserror::Error;

/// Error type shared by every storage trait in this crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Database operation failed
    #[error("database error: {0}")]
    Database(String),

    /// Serialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Requested item was not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller passed a value that violates a type invariant
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// An object was written into a collection that does not hold its kind
    #[error("collection mismatch: expected {expected}, got {actual}")]
    CollectionMismatch {
        /// Collection named by the caller
        expected: String,
        /// Collection the value belongs to
        actual: String,
    },
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_data() || e.is_syntax() || e.is_eof() {
            Self::Deserialization(e.to_string())
        } else {
            Self::Serialization(e.to_string())
        }
    }
}
