//! Memory-based storage implementation of the key/value store

use agora_storage_traits::StorageError;
use agora_storage_traits::kv::KeyValueStorage;

use crate::AgoraMemoryStorage;

impl KeyValueStorage for AgoraMemoryStorage {
    fn kv_get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let mut inner = self.inner.write();
        Ok(inner.kv.get(key).cloned())
    }

    fn kv_set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.limits.check_key(key)?;
        self.limits.check_value(value)?;

        let mut inner = self.inner.write();
        inner.kv.put(key.to_string(), value.to_string());
        Ok(())
    }

    fn kv_remove(&self, key: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        inner.kv.pop(key);
        Ok(())
    }

    fn kv_clear(&self) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        inner.kv.clear();
        Ok(())
    }

    fn kv_multi_get(&self, keys: &[&str]) -> Result<Vec<Option<String>>, StorageError> {
        let mut inner = self.inner.write();
        Ok(keys.iter().map(|key| inner.kv.get(*key).cloned()).collect())
    }

    fn kv_multi_set(&self, entries: &[(&str, &str)]) -> Result<(), StorageError> {
        // Validate everything before touching the store so a bad entry writes nothing.
        for (key, value) in entries {
            self.limits.check_key(key)?;
            self.limits.check_value(value)?;
        }

        let mut inner = self.inner.write();
        for (key, value) in entries {
            inner.kv.put((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ValidationLimits;

    #[test]
    fn test_oversized_value_rejected() {
        let storage =
            AgoraMemoryStorage::with_limits(ValidationLimits::default().with_max_value_length(4));
        let err = storage.kv_set("k", "too long").unwrap_err();
        assert!(matches!(err, StorageError::InvalidParameters(_)));
        assert_eq!(storage.kv_get("k").unwrap(), None);
    }

    #[test]
    fn test_multi_set_is_all_or_nothing() {
        let storage =
            AgoraMemoryStorage::with_limits(ValidationLimits::default().with_max_key_length(3));
        let result = storage.kv_multi_set(&[("a", "1"), ("toolong", "2")]);
        assert!(result.is_err());
        assert_eq!(storage.kv_get("a").unwrap(), None);
    }

    #[test]
    fn test_empty_key_rejected() {
        let storage = AgoraMemoryStorage::default();
        assert!(storage.kv_set("", "v").is_err());
    }
}
