//! Input validation constants and utilities for SQLite storage.
//!
//! These limits prevent unbounded input from causing disk and CPU exhaustion.

use crate::error::Error;

/// Maximum length for a key/value key (512 bytes, UTF-8 encoded)
pub const MAX_KEY_LENGTH: usize = 512;

/// Maximum size for a key/value value (4 MB)
pub const MAX_VALUE_SIZE: usize = 4 * 1024 * 1024;

/// Maximum size for a serialized cached object (1 MB)
pub const MAX_OBJECT_JSON_SIZE: usize = 1024 * 1024;

/// Validate that a string does not exceed the specified maximum length in bytes.
///
/// Note: This validates UTF-8 byte length, not Unicode character count.
#[inline]
pub fn validate_string_length(s: &str, max_length: usize, field_name: &str) -> Result<(), Error> {
    if s.len() > max_length {
        return Err(Error::Validation {
            field_name: field_name.to_string(),
            max_size: max_length,
            actual_size: s.len(),
        });
    }
    Ok(())
}
