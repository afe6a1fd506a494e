//! Implementation of RateLimitStorage trait for SQLite storage.

use agora_storage_traits::StorageError;
use agora_storage_traits::rate_limit::RateLimitStorage;
use agora_storage_traits::rate_limit::types::RateLimitRecord;
use rusqlite::{OptionalExtension, params};

use crate::AgoraSqliteStorage;
use crate::error::into_storage_err;
use crate::validation::{MAX_KEY_LENGTH, validate_string_length};

impl RateLimitStorage for AgoraSqliteStorage {
    fn rate_limit_get(
        &self,
        identifier: &str,
        action: &str,
    ) -> Result<Option<RateLimitRecord>, StorageError> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT identifier, action, attempt_count, window_start, blocked_until
                 FROM rate_limits WHERE identifier = ?1 AND action = ?2",
                params![identifier, action],
                |row| {
                    Ok(RateLimitRecord {
                        identifier: row.get(0)?,
                        action: row.get(1)?,
                        attempt_count: row.get(2)?,
                        window_start: row.get(3)?,
                        blocked_until: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(into_storage_err)
        })
    }

    fn rate_limit_save(&self, record: &RateLimitRecord) -> Result<(), StorageError> {
        validate_string_length(&record.identifier, MAX_KEY_LENGTH, "Identifier")?;
        validate_string_length(&record.action, MAX_KEY_LENGTH, "Action")?;

        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO rate_limits
                 (identifier, action, attempt_count, window_start, blocked_until)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(identifier, action) DO UPDATE SET
                     attempt_count = excluded.attempt_count,
                     window_start = excluded.window_start,
                     blocked_until = excluded.blocked_until",
                params![
                    record.identifier,
                    record.action,
                    record.attempt_count,
                    record.window_start,
                    record.blocked_until,
                ],
            )
            .map_err(into_storage_err)?;
            Ok(())
        })
    }

    fn rate_limit_remove(&self, identifier: &str, action: &str) -> Result<(), StorageError> {
        self.with_connection(|conn| {
            conn.execute(
                "DELETE FROM rate_limits WHERE identifier = ?1 AND action = ?2",
                params![identifier, action],
            )
            .map_err(into_storage_err)?;
            Ok(())
        })
    }
}
