//! Objects module
//!
//! The structured object cache: one collection per entity kind, each holding typed
//! [`types::CachedObject`] values keyed by id and stamped with their write time. The storage
//! layer only stores and returns stamps; age filtering is applied by the caller.

pub mod types;

use self::types::{Collection, StoredObject};
use crate::error::StorageError;

/// Schema version of the object store. Opening a store written with an older version drops
/// its contents, since everything in it is derived data.
pub const OBJECT_STORE_VERSION: u32 = 1;

/// Storage traits for the objects module
pub trait ObjectStorage {
    /// Open the store, creating one collection per [`Collection`] on first use.
    ///
    /// Idempotent. Returns the store version.
    fn objects_init(&self) -> Result<u32, StorageError>;

    /// Insert or replace `object` under `key` in `collection`.
    ///
    /// Fails with [`StorageError::CollectionMismatch`] when the value belongs to another
    /// collection.
    fn objects_put(
        &self,
        collection: Collection,
        key: &str,
        object: &StoredObject,
    ) -> Result<(), StorageError>;

    /// Get the object stored under `key` in `collection`, regardless of its age
    fn objects_get(
        &self,
        collection: Collection,
        key: &str,
    ) -> Result<Option<StoredObject>, StorageError>;

    /// Get every object in `collection`, regardless of age, ordered by key
    fn objects_get_all(&self, collection: Collection) -> Result<Vec<StoredObject>, StorageError>;

    /// Remove every object in `collection`
    fn objects_clear(&self, collection: Collection) -> Result<(), StorageError>;

    /// Remove every object in every collection
    fn objects_clear_all(&self) -> Result<(), StorageError>;
}
