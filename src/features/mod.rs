//! Feature implementations for offsync.
//!
//! - Offline mutation queue with connectivity-driven sync

pub mod queue;
