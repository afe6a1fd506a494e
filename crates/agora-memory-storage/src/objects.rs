//! Memory-based storage implementation of the structured object store

use agora_storage_traits::StorageError;
use agora_storage_traits::objects::types::{Collection, StoredObject};
use agora_storage_traits::objects::{OBJECT_STORE_VERSION, ObjectStorage};
use lru::LruCache;

use crate::{AgoraMemoryStorage, AgoraMemoryStorageInner};

impl AgoraMemoryStorageInner {
    fn open_object_store(&mut self) -> u32 {
        if self.object_store_version != Some(OBJECT_STORE_VERSION) {
            self.objects.clear();
            for collection in Collection::ALL {
                self.objects
                    .insert(collection, LruCache::new(self.cache_size));
            }
            self.object_store_version = Some(OBJECT_STORE_VERSION);
        }
        OBJECT_STORE_VERSION
    }
}

impl ObjectStorage for AgoraMemoryStorage {
    fn objects_init(&self) -> Result<u32, StorageError> {
        let mut inner = self.inner.write();
        Ok(inner.open_object_store())
    }

    fn objects_put(
        &self,
        collection: Collection,
        key: &str,
        object: &StoredObject,
    ) -> Result<(), StorageError> {
        object.check_collection(collection)?;
        self.limits.check_key(key)?;

        let mut inner = self.inner.write();
        inner.open_object_store();
        if let Some(store) = inner.objects.get_mut(&collection) {
            store.put(key.to_string(), object.clone());
        }
        Ok(())
    }

    fn objects_get(
        &self,
        collection: Collection,
        key: &str,
    ) -> Result<Option<StoredObject>, StorageError> {
        let mut inner = self.inner.write();
        Ok(inner
            .objects
            .get_mut(&collection)
            .and_then(|store| store.get(key).cloned()))
    }

    fn objects_get_all(&self, collection: Collection) -> Result<Vec<StoredObject>, StorageError> {
        let inner = self.inner.read();
        let Some(store) = inner.objects.get(&collection) else {
            return Ok(Vec::new());
        };
        let mut entries: Vec<(&String, &StoredObject)> = store.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        Ok(entries.into_iter().map(|(_, obj)| obj.clone()).collect())
    }

    fn objects_clear(&self, collection: Collection) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        if let Some(store) = inner.objects.get_mut(&collection) {
            store.clear();
        }
        Ok(())
    }

    fn objects_clear_all(&self) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        for store in inner.objects.values_mut() {
            store.clear();
        }
        Ok(())
    }
}
