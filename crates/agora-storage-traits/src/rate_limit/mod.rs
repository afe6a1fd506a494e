//! Rate limit module
//!
//! Persisted attempt counters for the client-side rate limiter. One record per
//! `(identifier, action)` pair.

pub mod types;

use self::types::RateLimitRecord;
use crate::error::StorageError;

/// Storage traits for the rate limit module
pub trait RateLimitStorage {
    /// Get the counter for `(identifier, action)`
    fn rate_limit_get(
        &self,
        identifier: &str,
        action: &str,
    ) -> Result<Option<RateLimitRecord>, StorageError>;

    /// Insert or replace the counter keyed by the record's `(identifier, action)`
    fn rate_limit_save(&self, record: &RateLimitRecord) -> Result<(), StorageError>;

    /// Remove the counter for `(identifier, action)`. Removing a missing record is not an error.
    fn rate_limit_remove(&self, identifier: &str, action: &str) -> Result<(), StorageError>;
}
