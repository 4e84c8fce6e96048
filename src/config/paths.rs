//! Path resolution for offsync configuration and data files.
//!
//! All offsync data is stored in `~/.offsync/` unless overridden:
//! - `config.yaml` - Main configuration file
//! - `offsync.db` - SQLite key-value store holding the queue

use std::path::PathBuf;

use crate::error::OffsyncError;

/// Paths to offsync configuration and data files.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Root directory: `~/.offsync/`
    pub root: PathBuf,
    /// Config file: `~/.offsync/config.yaml`
    pub config_file: PathBuf,
    /// Database file: `~/.offsync/offsync.db`
    pub database: PathBuf,
}

impl Paths {
    /// Create paths based on the user's home directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> Result<Self, OffsyncError> {
        let home = std::env::var("HOME").map_err(|_| {
            OffsyncError::Config("Could not determine home directory".to_string())
        })?;

        Ok(Self::with_root(PathBuf::from(home).join(".offsync")))
    }

    /// Create paths with a custom root directory.
    #[must_use]
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            config_file: root.join("config.yaml"),
            database: root.join("offsync.db"),
            root,
        }
    }

    /// Resolve paths from an explicit `--home` override, falling back to `~/.offsync/`.
    ///
    /// # Errors
    ///
    /// Returns an error if no override is given and the home directory is unknown.
    pub fn resolve(home: Option<PathBuf>) -> Result<Self, OffsyncError> {
        match home {
            Some(root) => Ok(Self::with_root(root)),
            None => Self::new(),
        }
    }

    /// Ensure the root directory exists.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation fails.
    pub fn ensure_dirs(&self) -> Result<(), OffsyncError> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root).map_err(|e| {
                OffsyncError::Config(format!(
                    "Failed to create directory {}: {e}",
                    self.root.display()
                ))
            })?;
        }
        Ok(())
    }
}
