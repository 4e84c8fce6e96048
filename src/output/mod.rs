//! Output formatting for offsync.
//!
//! Pretty output is for terminals; JSON output is for scripts.

mod json;
mod pretty;

use chrono::{DateTime, Utc};

use crate::cli::args::OutputFormat;
use crate::error::OffsyncError;
use crate::features::queue::{QueueItem, QueueStatus, SyncOutcome};

pub use json::*;
pub use pretty::*;

/// Format queue items based on output format
///
/// `total` is the queue length before any limit was applied.
///
/// # Errors
///
/// Returns `OffsyncError::Parse` if JSON serialization fails.
pub fn format_queue(
    items: &[QueueItem],
    total: usize,
    ceiling: u32,
    now: DateTime<Utc>,
    format: OutputFormat,
) -> Result<String, OffsyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_queue_pretty(items, total, ceiling, now)),
        OutputFormat::Json => format_queue_json(items, total),
    }
}

/// Format a status snapshot based on output format
///
/// # Errors
///
/// Returns `OffsyncError::Parse` if JSON serialization fails.
pub fn format_status(
    status: &QueueStatus,
    now: DateTime<Utc>,
    format: OutputFormat,
) -> Result<String, OffsyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_status_pretty(status, now)),
        OutputFormat::Json => format_status_json(status),
    }
}

/// Format a sync outcome based on output format
///
/// # Errors
///
/// Returns `OffsyncError::Parse` if JSON serialization fails.
pub fn format_outcome(outcome: &SyncOutcome, format: OutputFormat) -> Result<String, OffsyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_outcome_pretty(outcome)),
        OutputFormat::Json => format_outcome_json(outcome),
    }
}
