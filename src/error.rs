//! Error types for offsync.

use thiserror::Error;

/// Errors surfaced by offsync commands and the queue manager.
///
/// Per-item delivery failures are not represented here; they are
/// [`DeliveryError`](crate::features::queue::DeliveryError)s recorded on the
/// item and never abort a sync pass.
#[derive(Debug, Error)]
pub enum OffsyncError {
    /// Configuration could not be read, parsed or written.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The SQLite store failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Filesystem or terminal I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A queue item or other resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The user supplied an argument that cannot be used.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The HTTP client could not be built.
    #[error("HTTP error: {0}")]
    Http(String),
}

impl From<serde_json::Error> for OffsyncError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

impl From<rusqlite::Error> for OffsyncError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}
