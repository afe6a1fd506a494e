//! Memory-based storage implementation for the Agora client core.
//!
//! It implements the [`AgoraStorageProvider`] trait, allowing it to be used as an in-memory
//! storage backend. Memory-based storage is non-persistent and is cleared when the
//! application terminates. It's useful for tests and for sessions that must not leave
//! anything on disk.
//!
//! ## Memory Exhaustion Protection
//!
//! Every store is an LRU cache bounded by [`ValidationLimits::cache_size`]; the least recently
//! used entries are evicted first. Keys and values are length-checked on write:
//!
//! - [`DEFAULT_MAX_KEY_LENGTH`]: Maximum length of a key/value key in bytes
//! - [`DEFAULT_MAX_VALUE_LENGTH`]: Maximum length of a key/value value in bytes
//!
//! ```rust
//! use agora_memory_storage::{AgoraMemoryStorage, ValidationLimits};
//!
//! let limits = ValidationLimits::default()
//!     .with_cache_size(2000)
//!     .with_max_value_length(64 * 1024);
//!
//! let storage = AgoraMemoryStorage::with_limits(limits);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;

use agora_storage_traits::objects::types::{Collection, StoredObject};
use agora_storage_traits::rate_limit::types::RateLimitRecord;
use agora_storage_traits::{AgoraStorageProvider, Backend, StorageError};
use lru::LruCache;
use parking_lot::RwLock;

mod kv;
mod objects;
mod rate_limit;

/// Default cache size for each LRU cache
const DEFAULT_CACHE_SIZE: NonZeroUsize = match NonZeroUsize::new(1000) {
    Some(v) => v,
    None => panic!("cache size must be non-zero"),
};

/// Default maximum length of a key/value key in bytes.
pub const DEFAULT_MAX_KEY_LENGTH: usize = 512;

/// Default maximum length of a key/value value in bytes.
/// Message pages are the largest payloads written through this store.
pub const DEFAULT_MAX_VALUE_LENGTH: usize = 4 * 1024 * 1024;

/// Configurable validation limits for memory storage.
///
/// All limits have defaults that can be overridden using the builder pattern.
#[derive(Debug, Clone, Copy)]
pub struct ValidationLimits {
    /// Maximum number of items in each LRU cache
    pub cache_size: usize,
    /// Maximum length of a key in bytes
    pub max_key_length: usize,
    /// Maximum length of a value in bytes
    pub max_value_length: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            cache_size: DEFAULT_CACHE_SIZE.get(),
            max_key_length: DEFAULT_MAX_KEY_LENGTH,
            max_value_length: DEFAULT_MAX_VALUE_LENGTH,
        }
    }
}

impl ValidationLimits {
    /// Creates a new `ValidationLimits` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of items in each LRU cache.
    ///
    /// # Panics
    ///
    /// Panics if `size` is 0.
    pub fn with_cache_size(mut self, size: usize) -> Self {
        assert!(size > 0, "cache_size must be greater than 0");
        self.cache_size = size;
        self
    }

    /// Sets the maximum length of a key in bytes.
    ///
    /// # Panics
    ///
    /// Panics if `limit` is 0.
    pub fn with_max_key_length(mut self, limit: usize) -> Self {
        assert!(limit > 0, "max_key_length must be greater than 0");
        self.max_key_length = limit;
        self
    }

    /// Sets the maximum length of a value in bytes.
    ///
    /// # Panics
    ///
    /// Panics if `limit` is 0.
    pub fn with_max_value_length(mut self, limit: usize) -> Self {
        assert!(limit > 0, "max_value_length must be greater than 0");
        self.max_value_length = limit;
        self
    }

    pub(crate) fn check_key(&self, key: &str) -> Result<(), StorageError> {
        if key.is_empty() {
            return Err(StorageError::InvalidParameters(
                "key must not be empty".to_string(),
            ));
        }
        if key.len() > self.max_key_length {
            return Err(StorageError::InvalidParameters(format!(
                "key exceeds maximum length of {} bytes",
                self.max_key_length
            )));
        }
        Ok(())
    }

    pub(crate) fn check_value(&self, value: &str) -> Result<(), StorageError> {
        if value.len() > self.max_value_length {
            return Err(StorageError::InvalidParameters(format!(
                "value exceeds maximum length of {} bytes",
                self.max_value_length
            )));
        }
        Ok(())
    }
}

/// A memory-based storage implementation for the Agora client core.
///
/// ## Thread Safety
///
/// All stores live behind a single `RwLock`, so a multi-key write such as
/// `kv_multi_set` is applied atomically with respect to other callers.
pub struct AgoraMemoryStorage {
    /// Configurable validation limits
    limits: ValidationLimits,
    /// Thread-safe inner storage
    inner: RwLock<AgoraMemoryStorageInner>,
}

struct AgoraMemoryStorageInner {
    cache_size: NonZeroUsize,
    kv: LruCache<String, String>,
    /// `None` until the object store is opened
    object_store_version: Option<u32>,
    objects: HashMap<Collection, LruCache<String, StoredObject>>,
    rate_limits: LruCache<(String, String), RateLimitRecord>,
}

impl fmt::Debug for AgoraMemoryStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgoraMemoryStorage")
            .field("limits", &self.limits)
            .field("inner", &"RwLock<AgoraMemoryStorageInner>")
            .finish()
    }
}

impl Default for AgoraMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl AgoraMemoryStorage {
    /// Creates a new `AgoraMemoryStorage` with the default configuration.
    pub fn new() -> Self {
        Self::with_limits(ValidationLimits::default())
    }

    /// Creates a new `AgoraMemoryStorage` with the specified cache size.
    pub fn with_cache_size(cache_size: NonZeroUsize) -> Self {
        Self::with_limits(ValidationLimits::default().with_cache_size(cache_size.get()))
    }

    /// Creates a new `AgoraMemoryStorage` with the provided validation limits.
    pub fn with_limits(limits: ValidationLimits) -> Self {
        let cache_size = NonZeroUsize::new(limits.cache_size).unwrap_or(DEFAULT_CACHE_SIZE);

        let inner = AgoraMemoryStorageInner {
            cache_size,
            kv: LruCache::new(cache_size),
            object_store_version: None,
            objects: HashMap::new(),
            rate_limits: LruCache::new(cache_size),
        };

        AgoraMemoryStorage {
            limits,
            inner: RwLock::new(inner),
        }
    }

    /// Returns the current validation limits.
    pub fn limits(&self) -> &ValidationLimits {
        &self.limits
    }
}

impl AgoraStorageProvider for AgoraMemoryStorage {
    /// Returns [`Backend::Memory`].
    fn backend(&self) -> Backend {
        Backend::Memory
    }
}
