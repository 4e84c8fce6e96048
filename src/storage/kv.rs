//! Key-value persistence.
//!
//! The queue manager only needs string values under string keys, the same
//! contract a browser's local storage offers. [`SqliteStore`] keeps them in
//! the `kv_store` table; [`MemoryStore`] keeps them in a map.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use rusqlite::{params, OptionalExtension, TransactionBehavior};

use crate::error::OffsyncError;

use super::Database;

/// String-keyed storage for serialized state.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn get_item(&self, key: &str) -> Result<Option<String>, OffsyncError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    fn set_item(&self, key: &str, value: &str) -> Result<(), OffsyncError>;

    /// Delete `key`. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    fn remove_item(&self, key: &str) -> Result<(), OffsyncError>;

    /// Replace the value under `key` with `f(current)`, atomically with
    /// respect to every other writer of the same store.
    ///
    /// Nothing is written if `f` fails.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, or an error if the store cannot be read
    /// or written.
    fn update_item(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<String>) -> Result<String, OffsyncError>,
    ) -> Result<(), OffsyncError>;
}

const UPSERT: &str = r"INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
    ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at";

/// [`KeyValueStore`] backed by the `SQLite` database.
pub struct SqliteStore {
    db: Mutex<Database>,
}

impl SqliteStore {
    /// Wrap an open database.
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    /// Open (creating if needed) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: &std::path::Path) -> Result<Self, OffsyncError> {
        Ok(Self::new(Database::open_at(path)?))
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_in_memory() -> Result<Self, OffsyncError> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    fn with_db<T>(
        &self,
        f: impl FnOnce(&mut Database) -> Result<T, OffsyncError>,
    ) -> Result<T, OffsyncError> {
        let mut db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut db)
    }
}

impl KeyValueStore for SqliteStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, OffsyncError> {
        self.with_db(|db| {
            db.connection()
                .query_row("SELECT value FROM kv_store WHERE key = ?1", [key], |row| {
                    row.get(0)
                })
                .optional()
                .map_err(|e| OffsyncError::Database(format!("Failed to read key {key}: {e}")))
        })
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), OffsyncError> {
        self.with_db(|db| {
            db.connection()
                .execute(UPSERT, params![key, value, Utc::now().to_rfc3339()])
                .map_err(|e| OffsyncError::Database(format!("Failed to write key {key}: {e}")))?;
            Ok(())
        })
    }

    fn remove_item(&self, key: &str) -> Result<(), OffsyncError> {
        self.with_db(|db| {
            db.connection()
                .execute("DELETE FROM kv_store WHERE key = ?1", [key])
                .map_err(|e| OffsyncError::Database(format!("Failed to delete key {key}: {e}")))?;
            Ok(())
        })
    }

    fn update_item(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<String>) -> Result<String, OffsyncError>,
    ) -> Result<(), OffsyncError> {
        self.with_db(|db| {
            // IMMEDIATE takes the write lock up front, so another process
            // cannot write between our read and our write.
            let tx = db
                .connection_mut()
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| OffsyncError::Database(format!("Failed to lock key {key}: {e}")))?;

            let current: Option<String> = tx
                .query_row("SELECT value FROM kv_store WHERE key = ?1", [key], |row| {
                    row.get(0)
                })
                .optional()
                .map_err(|e| OffsyncError::Database(format!("Failed to read key {key}: {e}")))?;

            let next = f(current)?;
            tx.execute(UPSERT, params![key, next, Utc::now().to_rfc3339()])
                .map_err(|e| OffsyncError::Database(format!("Failed to write key {key}: {e}")))?;
            tx.commit()
                .map_err(|e| OffsyncError::Database(format!("Failed to commit key {key}: {e}")))
        })
    }
}

/// In-memory [`KeyValueStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, OffsyncError> {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), OffsyncError> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), OffsyncError> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.remove(key);
        Ok(())
    }

    fn update_item(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<String>) -> Result<String, OffsyncError>,
    ) -> Result<(), OffsyncError> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        let next = f(items.get(key).cloned())?;
        items.insert(key.to_string(), next);
        Ok(())
    }
}
