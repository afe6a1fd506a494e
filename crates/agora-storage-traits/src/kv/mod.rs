//! Key/value module
//!
//! The local persistence layer: a flat string-to-string store that survives reloads when the
//! provider is persistent. The store itself never expires anything. Callers that need a TTL
//! wrap their payload in a [`types::CachedEntry`] and write it as a single record, so a value
//! and its expiry can never be torn apart by an interrupted write.

pub mod types;

use crate::error::StorageError;

/// Storage traits for the key/value module
pub trait KeyValueStorage {
    /// Get the raw value stored under `key`
    fn kv_get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Insert or replace the value stored under `key`
    fn kv_set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Removing a missing key is not an error.
    fn kv_remove(&self, key: &str) -> Result<(), StorageError>;

    /// Remove every key
    fn kv_clear(&self) -> Result<(), StorageError>;

    /// Get several keys at once. The result has one slot per requested key, in order.
    fn kv_multi_get(&self, keys: &[&str]) -> Result<Vec<Option<String>>, StorageError>;

    /// Write several keys at once. Either every entry is written or none is.
    fn kv_multi_set(&self, entries: &[(&str, &str)]) -> Result<(), StorageError>;
}
