//! Implementation of KeyValueStorage trait for SQLite storage.

use agora_storage_traits::StorageError;
use agora_storage_traits::kv::KeyValueStorage;
use rusqlite::{OptionalExtension, params};

use crate::AgoraSqliteStorage;
use crate::error::into_storage_err;
use crate::validation::{MAX_KEY_LENGTH, MAX_VALUE_SIZE, validate_string_length};

fn validate_entry(key: &str, value: &str) -> Result<(), StorageError> {
    if key.is_empty() {
        return Err(StorageError::InvalidParameters(
            "key must not be empty".to_string(),
        ));
    }
    validate_string_length(key, MAX_KEY_LENGTH, "Key")?;
    validate_string_length(value, MAX_VALUE_SIZE, "Value")?;
    Ok(())
}

const UPSERT_SQL: &str = "INSERT INTO kv_entries (key, value) VALUES (?1, ?2)
     ON CONFLICT(key) DO UPDATE SET value = excluded.value";

impl KeyValueStorage for AgoraSqliteStorage {
    fn kv_get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT value FROM kv_entries WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(into_storage_err)
        })
    }

    fn kv_set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        validate_entry(key, value)?;

        self.with_connection(|conn| {
            conn.execute(UPSERT_SQL, params![key, value])
                .map_err(into_storage_err)?;
            Ok(())
        })
    }

    fn kv_remove(&self, key: &str) -> Result<(), StorageError> {
        self.with_connection(|conn| {
            conn.execute("DELETE FROM kv_entries WHERE key = ?1", params![key])
                .map_err(into_storage_err)?;
            Ok(())
        })
    }

    fn kv_clear(&self) -> Result<(), StorageError> {
        self.with_connection(|conn| {
            conn.execute("DELETE FROM kv_entries", [])
                .map_err(into_storage_err)?;
            Ok(())
        })
    }

    fn kv_multi_get(&self, keys: &[&str]) -> Result<Vec<Option<String>>, StorageError> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare_cached("SELECT value FROM kv_entries WHERE key = ?1")
                .map_err(into_storage_err)?;
            keys.iter()
                .map(|key| {
                    stmt.query_row(params![key], |row| row.get(0))
                        .optional()
                        .map_err(into_storage_err)
                })
                .collect()
        })
    }

    fn kv_multi_set(&self, entries: &[(&str, &str)]) -> Result<(), StorageError> {
        for (key, value) in entries {
            validate_entry(key, value)?;
        }

        self.with_connection(|conn| {
            let tx = conn.transaction().map_err(into_storage_err)?;
            {
                let mut stmt = tx.prepare_cached(UPSERT_SQL).map_err(into_storage_err)?;
                for (key, value) in entries {
                    stmt.execute(params![key, value])
                        .map_err(into_storage_err)?;
                }
            }
            tx.commit().map_err(into_storage_err)
        })
    }
}
