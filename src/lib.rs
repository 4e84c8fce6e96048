//! offsync - an offline mutation queue
//!
//! Queues create/update/delete mutations while a REST backend is
//! unreachable, persists them, and replays them in order with bounded
//! retries once connectivity returns.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod features;
pub mod output;
pub mod storage;

pub use cli::args::{Cli, Commands, OutputFormat};
pub use error::OffsyncError;
pub use features::queue::{OfflineQueueManager, OperationKind, QueueItem};
