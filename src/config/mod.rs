//! Configuration management for offsync.
//!
//! This module handles loading and saving configuration from `~/.offsync/`.

mod paths;
mod settings;

pub use paths::Paths;
pub use settings::{BackendConfig, ColorSetting, Config, GeneralConfig, QueueConfig, SyncConfig};
