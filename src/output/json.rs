//! JSON output formatting for offsync.

use serde::Serialize;
use serde_json::json;

use crate::error::OffsyncError;
use crate::features::queue::{QueueItem, QueueStatus, SyncOutcome};

/// Format queue items as JSON
///
/// # Errors
///
/// Returns `OffsyncError::Parse` if JSON serialization fails.
pub fn format_queue_json(items: &[QueueItem], total: usize) -> Result<String, OffsyncError> {
    let output = json!({
        "count": items.len(),
        "total": total,
        "items": items
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Format a queue status snapshot as JSON
///
/// # Errors
///
/// Returns `OffsyncError::Parse` if JSON serialization fails.
pub fn format_status_json(status: &QueueStatus) -> Result<String, OffsyncError> {
    let mut value = serde_json::to_value(status)?;
    if let Some(obj) = value.as_object_mut() {
        obj.insert("banner".to_string(), json!(status.banner()));
    }
    Ok(serde_json::to_string_pretty(&value)?)
}

/// Format a sync outcome as JSON
///
/// # Errors
///
/// Returns `OffsyncError::Parse` if JSON serialization fails.
pub fn format_outcome_json(outcome: &SyncOutcome) -> Result<String, OffsyncError> {
    let output = match outcome {
        SyncOutcome::Completed(report) => json!({
            "ran": true,
            "succeeded": report.succeeded,
            "failed": report.failed,
            "total": report.total(),
            "results": report.results,
        }),
        SyncOutcome::Skipped(reason) => json!({
            "ran": false,
            "skipped": reason,
            "reason": reason.to_string(),
        }),
    };
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Convert any serializable value to pretty JSON
///
/// # Errors
///
/// Returns `OffsyncError::Parse` if JSON serialization fails.
pub fn to_json<T: Serialize>(value: &T) -> Result<String, OffsyncError> {
    Ok(serde_json::to_string_pretty(value)?)
}
