//! Command implementations for offsync.
//!
//! Commands return the text to print; `main` does the printing.

mod completions;
mod config;
mod queue;

pub use completions::completions;
pub use config::config;
pub use queue::{clear, enqueue, list, remove, status, sync, watch};
