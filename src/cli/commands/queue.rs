//! Queue command implementations.
//!
//! Each command works on an already-initialized manager; the caller decides
//! how it is composed.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use colored::Colorize;
use serde_json::json;
use tracing::debug;

use crate::cli::args::OutputFormat;
use crate::error::OffsyncError;
use crate::features::queue::{
    ConnectivityMonitor, ConnectivityProbe, MonitorUpdate, OfflineQueueManager, OperationKind,
    SyncOutcome,
};
use crate::output::{format_outcome, format_queue, format_status, to_json};

/// Queue a mutation.
///
/// # Errors
///
/// Returns an error if the payload is not valid JSON, the entity kind is
/// blank, or the queue cannot be persisted.
pub fn enqueue(
    manager: &OfflineQueueManager,
    operation: OperationKind,
    entity: &str,
    payload: &str,
    format: OutputFormat,
) -> Result<String, OffsyncError> {
    let payload: serde_json::Value = serde_json::from_str(payload)
        .map_err(|e| OffsyncError::InvalidInput(format!("Payload is not valid JSON: {e}")))?;

    if operation.targets_existing() && payload.get("id").is_none() {
        return Err(OffsyncError::InvalidInput(format!(
            "{} needs the record id in the payload, e.g. '{{\"id\": 42}}'",
            operation.as_str()
        )));
    }

    let id = manager.enqueue_action(operation, entity, payload)?;

    match format {
        OutputFormat::Json => {
            let item = manager
                .get(&id)
                .ok_or_else(|| OffsyncError::NotFound(format!("queue item {id}")))?;
            to_json(&item)
        },
        OutputFormat::Pretty => Ok(format!(
            "{} {} {} ({} pending)\n  ID: {}",
            "Queued".green(),
            operation.as_str(),
            entity.trim(),
            manager.len(),
            id
        )),
    }
}

/// List queued mutations.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn list(
    manager: &OfflineQueueManager,
    exhausted_only: bool,
    limit: Option<usize>,
    format: OutputFormat,
) -> Result<String, OffsyncError> {
    let items = if exhausted_only {
        manager.exhausted()
    } else {
        manager.queue()
    };
    let total = items.len();
    let shown = &items[..limit.map_or(total, |n| n.min(total))];

    format_queue(
        shown,
        total,
        manager.config().retry_ceiling,
        Utc::now(),
        format,
    )
}

/// Remove one queued mutation.
///
/// # Errors
///
/// Returns `NotFound` if no item has `id`, or an error if the queue cannot
/// be persisted.
pub fn remove(
    manager: &OfflineQueueManager,
    id: &str,
    format: OutputFormat,
) -> Result<String, OffsyncError> {
    if !manager.remove_from_queue(id)? {
        return Err(OffsyncError::NotFound(format!("queue item {id}")));
    }

    match format {
        OutputFormat::Json => to_json(&json!({
            "removed": id,
            "pending": manager.len(),
        })),
        OutputFormat::Pretty => Ok(format!(
            "Removed {id} ({} pending)",
            manager.len()
        )),
    }
}

/// Drop every queued mutation.
///
/// # Errors
///
/// Returns `InvalidInput` without `--force`, or an error if the queue cannot
/// be persisted.
pub fn clear(
    manager: &OfflineQueueManager,
    force: bool,
    format: OutputFormat,
) -> Result<String, OffsyncError> {
    if !force {
        return Err(OffsyncError::InvalidInput(format!(
            "Refusing to drop {} queued mutations without --force",
            manager.len()
        )));
    }

    let count = manager.clear()?;

    match format {
        OutputFormat::Json => to_json(&json!({ "cleared": count })),
        OutputFormat::Pretty => Ok(format!("Cleared {count} queued mutations")),
    }
}

/// Probe connectivity and report queue status.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub async fn status(
    manager: &OfflineQueueManager,
    probe: &dyn ConnectivityProbe,
    format: OutputFormat,
) -> Result<String, OffsyncError> {
    manager.set_online(probe.is_reachable().await);
    format_status(&manager.status(), Utc::now(), format)
}

/// Run one sync pass.
///
/// # Errors
///
/// Returns an error if the pass cannot persist its result.
pub async fn sync(
    manager: &OfflineQueueManager,
    probe: &dyn ConnectivityProbe,
    assume_online: bool,
    format: OutputFormat,
) -> Result<String, OffsyncError> {
    let online = if assume_online {
        true
    } else {
        probe.is_reachable().await
    };
    debug!(online, assume_online, "connectivity before sync");
    manager.set_online(online);

    let outcome = manager.sync_queue().await?;
    format_outcome(&outcome, format)
}

/// Watch connectivity until `shutdown` resolves, syncing on reconnect.
///
/// While the backend stays up, a failed pass is retried every
/// `retry_interval`; with `None` it waits for `offsync sync`. Every update is
/// printed as it happens and the final status is returned.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub async fn watch<S>(
    manager: &OfflineQueueManager,
    probe: &dyn ConnectivityProbe,
    interval: Duration,
    retry_interval: Option<Duration>,
    shutdown: S,
    format: OutputFormat,
) -> Result<String, OffsyncError>
where
    S: Future<Output = ()>,
{
    if format == OutputFormat::Pretty {
        println!(
            "{}",
            format!(
                "Watching connectivity every {}s, Ctrl-C to stop",
                interval.as_secs()
            )
            .dimmed()
        );
    }

    let mut monitor = ConnectivityMonitor::new(manager, probe, interval);
    if let Some(every) = retry_interval {
        monitor = monitor.with_retry_interval(every);
    }
    monitor
        .run(shutdown, |update| {
            println!("{}", watch_line(manager, update, format));
        })
        .await;

    format_status(&manager.status(), Utc::now(), format)
}

fn watch_line(
    manager: &OfflineQueueManager,
    update: &MonitorUpdate,
    format: OutputFormat,
) -> String {
    let event = match update {
        MonitorUpdate::Transition { event, .. } => event.to_string(),
        MonitorUpdate::Retried(_) => "retry".to_string(),
        MonitorUpdate::Drained(_) => "sync".to_string(),
    };

    match format {
        OutputFormat::Json => json!({
            "at": Utc::now().to_rfc3339(),
            "event": event,
            "outcome": update.outcome().map(outcome_summary),
        })
        .to_string(),
        OutputFormat::Pretty => {
            let status = manager.status();
            let banner = if status.needs_attention() {
                status.banner().yellow()
            } else {
                status.banner().green()
            };
            let mut line = format!(
                "{} {banner}",
                Utc::now().format("%H:%M:%S").to_string().dimmed()
            );
            if let Some(SyncOutcome::Completed(report)) = update.outcome() {
                line.push_str(&format!(
                    "  ({} synced, {} failed)",
                    report.succeeded, report.failed
                ));
            }
            line
        },
    }
}

fn outcome_summary(outcome: &SyncOutcome) -> serde_json::Value {
    match outcome {
        SyncOutcome::Completed(report) => json!({
            "succeeded": report.succeeded,
            "failed": report.failed,
        }),
        SyncOutcome::Skipped(reason) => json!({ "skipped": reason }),
    }
}
