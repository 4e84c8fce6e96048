//! `SQLite` database connection.
//!
//! The database is stored at `~/.offsync/offsync.db` and holds the
//! `kv_store` table backing [`SqliteStore`](super::SqliteStore).

use std::time::Duration;

use rusqlite::Connection;
use tracing::debug;

use crate::error::OffsyncError;

use super::migrations;

/// Database connection wrapper.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at a specific path.
    ///
    /// Creates the database file and runs migrations if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub fn open_at(path: &std::path::Path) -> Result<Self, OffsyncError> {
        let conn = Connection::open(path).map_err(|e| {
            OffsyncError::Database(format!("Failed to open database {}: {e}", path.display()))
        })?;
        // Other offsync processes may hold the write lock briefly.
        conn.busy_timeout(Duration::from_secs(5))?;

        let db = Self { conn };
        db.migrate()?;
        debug!(path = %path.display(), version = db.schema_version()?, "database ready");

        Ok(db)
    }

    /// Open an in-memory database (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub fn open_in_memory() -> Result<Self, OffsyncError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            OffsyncError::Database(format!("Failed to open in-memory database: {e}"))
        })?;

        let db = Self { conn };
        db.migrate()?;

        Ok(db)
    }

    fn migrate(&self) -> Result<(), OffsyncError> {
        migrations::run(&self.conn)
    }

    /// Get the current schema version.
    ///
    /// # Errors
    ///
    /// Returns an error if the version cannot be read.
    pub fn schema_version(&self) -> Result<i32, OffsyncError> {
        migrations::get_version(&self.conn)
    }

    /// Get a reference to the underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Mutable access to the connection, for transactions.
    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}
