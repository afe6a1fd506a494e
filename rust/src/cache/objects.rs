use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use agora_storage_traits::objects::types::{CachedObject, Collection, StoredObject};
use agora_storage_traits::objects::ObjectStorage;
use agora_storage_traits::{AgoraStorageProvider, StorageError};

use crate::clock::SharedClock;

pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(5 * 60);

/// Typed multi-collection cache with age-based reads.
///
/// Entries older than `max_age` read as absent but stay in storage until overwritten or
/// cleared; nothing compacts them in the background.
#[derive(Clone)]
pub struct ObjectCache {
    store: Arc<dyn AgoraStorageProvider>,
    clock: SharedClock,
    max_age_ms: i64,
    ready: Arc<AtomicBool>,
}

impl ObjectCache {
    pub fn new(store: Arc<dyn AgoraStorageProvider>, clock: SharedClock, max_age: Duration) -> Self {
        Self {
            store,
            clock,
            max_age_ms: i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX),
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Open the store. Safe to call any number of times; every other method calls it first.
    pub fn init(&self) -> Result<(), StorageError> {
        if self.ready.load(Ordering::Acquire) {
            return Ok(());
        }
        let version = self.store.objects_init()?;
        self.ready.store(true, Ordering::Release);
        tracing::debug!(version, "object cache ready");
        Ok(())
    }

    /// Write `value` under `key` in `collection`, stamped with the current time.
    pub fn set(
        &self,
        collection: Collection,
        key: &str,
        value: CachedObject,
    ) -> Result<(), StorageError> {
        self.init()?;
        let stored = StoredObject::new(value, self.clock.now_ms());
        self.store.objects_put(collection, key, &stored)
    }

    /// Write `value` into its own collection, keyed by its id.
    pub fn put(&self, value: CachedObject) -> Result<(), StorageError> {
        let collection = value.collection();
        let key = value.id().to_string();
        self.set(collection, &key, value)
    }

    pub fn get(&self, collection: Collection, key: &str) -> Result<Option<CachedObject>, StorageError> {
        self.init()?;
        let now = self.clock.now_ms();
        Ok(self
            .store
            .objects_get(collection, key)?
            .filter(|o| o.is_fresh(now, self.max_age_ms))
            .map(|o| o.value))
    }

    /// Fresh entries of `collection`, ordered by key.
    pub fn get_all(&self, collection: Collection) -> Result<Vec<CachedObject>, StorageError> {
        self.init()?;
        let now = self.clock.now_ms();
        Ok(self
            .store
            .objects_get_all(collection)?
            .into_iter()
            .filter(|o| o.is_fresh(now, self.max_age_ms))
            .map(|o| o.value)
            .collect())
    }

    pub fn clear(&self, collection: Collection) -> Result<(), StorageError> {
        self.init()?;
        self.store.objects_clear(collection)
    }

    pub fn clear_all(&self) -> Result<(), StorageError> {
        self.init()?;
        self.store.objects_clear_all()
    }
}
