//! Storage layer for offsync.
//!
//! A `SQLite` database holds a single key-value table; the serialized queue
//! lives under one key in it.

mod database;
mod kv;
mod migrations;

pub use database::Database;
pub use kv::{KeyValueStore, MemoryStore, SqliteStore};
