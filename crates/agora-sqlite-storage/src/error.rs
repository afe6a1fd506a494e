//! Error types for the SQLite storage implementation.

use agora_storage_traits::StorageError;

/// Error type for SQLite storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// SQLite database error
    #[error("Database error: {0}")]
    Database(String),
    /// Error from rusqlite
    #[error("SQLite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    /// Error during database migration
    #[error("Migration error: {0}")]
    Refinery(#[from] refinery::Error),
    /// Input validation error
    #[error("{field_name} exceeds maximum length of {max_size} bytes (got {actual_size} bytes)")]
    Validation {
        /// Name of the field that failed validation
        field_name: String,
        /// Maximum allowed size/length in bytes
        max_size: usize,
        /// Actual size/length in bytes
        actual_size: usize,
    },
}

impl From<Error> for StorageError {
    fn from(e: Error) -> Self {
        match e {
            Error::Validation { .. } => StorageError::InvalidParameters(e.to_string()),
            other => StorageError::Database(other.to_string()),
        }
    }
}

#[inline]
pub(crate) fn into_storage_err<T>(e: T) -> StorageError
where
    T: std::error::Error,
{
    StorageError::Database(e.to_string())
}
