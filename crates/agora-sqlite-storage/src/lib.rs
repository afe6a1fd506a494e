//! SQLite-based storage implementation for the Agora client core.
//!
//! This module provides a SQLite-based storage implementation of the
//! [`AgoraStorageProvider`] trait. It persists the key/value cache, the structured object
//! store and the rate-limit counters in a single database file so they survive a reload.
//!
//! The schema is managed with embedded `refinery` migrations (see `migrations/`).
//!
//! ```no_run
//! use agora_sqlite_storage::AgoraSqliteStorage;
//!
//! let storage = AgoraSqliteStorage::new("/path/to/agora.db")?;
//! # Ok::<(), agora_sqlite_storage::error::Error>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use agora_storage_traits::{AgoraStorageProvider, Backend, StorageError};
use rusqlite::Connection;

pub mod error;
mod kv;
mod migrations;
mod objects;
mod rate_limit;
mod validation;

use self::error::Error;

/// A SQLite-based storage implementation for the Agora client core.
///
/// A single connection is shared behind a mutex; every trait method holds it for the
/// duration of its statement or transaction.
#[derive(Debug, Clone)]
pub struct AgoraSqliteStorage {
    connection: Arc<Mutex<Connection>>,
    /// Set once the object store has been opened on this connection.
    object_store_open: Arc<AtomicBool>,
}

impl AgoraSqliteStorage {
    /// Opens (or creates) the database at `file_path` and applies pending migrations.
    pub fn new<P>(file_path: P) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        let file_path = file_path.as_ref();
        if let Some(parent) = file_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Database(format!("failed to create {}: {e}", parent.display()))
            })?;
        }

        let mut connection = Connection::open(file_path)?;
        connection.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")?;
        migrations::run_migrations(&mut connection)?;

        tracing::debug!(path = %file_path.display(), "opened sqlite storage");

        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
            object_store_open: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Creates a new in-memory [`AgoraSqliteStorage`]. Nothing is persisted.
    pub fn new_in_memory() -> Result<Self, Error> {
        let mut connection = Connection::open_in_memory()?;
        connection.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrations::run_migrations(&mut connection)?;

        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
            object_store_open: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Runs `f` with exclusive access to the connection.
    pub(crate) fn with_connection<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StorageError>,
    {
        let mut conn = self
            .connection
            .lock()
            .map_err(|_| StorageError::Database("connection lock poisoned".to_string()))?;
        f(&mut conn)
    }
}

impl AgoraStorageProvider for AgoraSqliteStorage {
    /// Returns [`Backend::SQLite`].
    fn backend(&self) -> Backend {
        Backend::SQLite
    }
}
