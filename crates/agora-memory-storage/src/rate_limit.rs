//! Memory-based storage implementation of the rate-limit counters

use agora_storage_traits::StorageError;
use agora_storage_traits::rate_limit::RateLimitStorage;
use agora_storage_traits::rate_limit::types::RateLimitRecord;

use crate::AgoraMemoryStorage;

impl RateLimitStorage for AgoraMemoryStorage {
    fn rate_limit_get(
        &self,
        identifier: &str,
        action: &str,
    ) -> Result<Option<RateLimitRecord>, StorageError> {
        let mut inner = self.inner.write();
        Ok(inner
            .rate_limits
            .get(&(identifier.to_string(), action.to_string()))
            .cloned())
    }

    fn rate_limit_save(&self, record: &RateLimitRecord) -> Result<(), StorageError> {
        self.limits.check_key(&record.identifier)?;
        self.limits.check_key(&record.action)?;

        let mut inner = self.inner.write();
        inner.rate_limits.put(
            (record.identifier.clone(), record.action.clone()),
            record.clone(),
        );
        Ok(())
    }

    fn rate_limit_remove(&self, identifier: &str, action: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        inner
            .rate_limits
            .pop(&(identifier.to_string(), action.to_string()));
        Ok(())
    }
}
