use chrono::{DateTime, Utc};
use colored::Colorize;

use crate::core::format_age;
use crate::features::queue::{OperationKind, QueueItem, QueueStatus, SyncOutcome, SyncStatus};

fn operation_label(kind: OperationKind) -> String {
    let label = format!("{:<6}", kind.as_str());
    match kind {
        OperationKind::Create => label.green().to_string(),
        OperationKind::Update => label.yellow().to_string(),
        OperationKind::Delete => label.red().to_string(),
    }
}

/// Format queue items as a pretty list, oldest first
pub fn format_queue_pretty(
    items: &[QueueItem],
    total: usize,
    ceiling: u32,
    now: DateTime<Utc>,
) -> String {
    if items.is_empty() {
        return "Offline queue (0 items)\n  Nothing pending".to_string();
    }

    let mut output = if items.len() < total {
        format!("Offline queue ({} of {} items)\n", items.len(), total)
    } else {
        format!("Offline queue ({} items)\n", items.len())
    };
    output.push_str(&"─".repeat(60));
    output.push('\n');

    for item in items {
        let mut line = format!(
            "{}  {} {}",
            item.id.dimmed(),
            operation_label(item.operation_kind),
            item.entity_kind.bold()
        );

        if let Some(target) = item.target_id() {
            line.push_str(&format!(" #{target}"));
        }

        line.push_str(&format!("  {}", format_age(item.enqueued_at, now).dimmed()));

        if item.is_exhausted(ceiling) {
            line.push_str(&format!("  {}", "needs review".red().bold()));
        } else if item.retry_count > 0 {
            line.push_str(&format!(
                "  {}",
                format!("retry {}/{ceiling}", item.retry_count).yellow()
            ));
        }

        output.push_str(&line);
        output.push('\n');

        if let Some(err) = &item.last_error {
            output.push_str(&format!("    {}\n", err.dimmed()));
        }
    }

    output
}

/// Format a queue status snapshot
pub fn format_status_pretty(status: &QueueStatus, now: DateTime<Utc>) -> String {
    let banner = status.banner();
    let banner = if !status.is_online || status.sync_status == SyncStatus::Error {
        banner.red().bold()
    } else if status.pending > 0 {
        banner.yellow().bold()
    } else {
        banner.green().bold()
    };

    let mut lines = vec![banner.to_string(), "─".repeat(40)];
    lines.push(format!(
        "  Connection: {}",
        if status.is_online {
            "online".green()
        } else {
            "offline".red()
        }
    ));
    lines.push(format!("  Sync:       {}", status.sync_status));
    lines.push(format!("  Pending:    {}", status.pending));
    lines.push(format!(
        "  Exhausted:  {} {}",
        status.exhausted,
        if status.exhausted > 0 {
            "items need review".red()
        } else {
            "".normal()
        }
    ));

    if let Some(oldest) = status.oldest {
        lines.push(format!("  Oldest:     {}", format_age(oldest, now).dimmed()));
    }

    if status.pending > 0 && status.is_online {
        lines.push(String::new());
        lines.push(
            "Run 'offsync sync' to replay pending mutations"
                .dimmed()
                .to_string(),
        );
    }

    lines.join("\n")
}

/// Format the outcome of a sync request
pub fn format_outcome_pretty(outcome: &SyncOutcome) -> String {
    let report = match outcome {
        SyncOutcome::Skipped(reason) => return format!("Sync skipped: {reason}"),
        SyncOutcome::Completed(report) => report,
    };

    let mut lines = Vec::new();
    for result in &report.results {
        let marker = if result.success {
            "✓".green()
        } else {
            "✗".red()
        };
        let mut line = format!(
            "{marker} {} {} {}",
            result.operation_kind.as_str(),
            result.entity_kind,
            result.id.dimmed()
        );
        if let Some(err) = &result.error {
            line.push_str(&format!("  {}", err.red()));
        }
        lines.push(line);
    }

    lines.push(String::new());
    let summary = format!(
        "Synced {} of {} mutations ({} failed)",
        report.succeeded,
        report.total(),
        report.failed
    );
    lines.push(if report.all_succeeded() {
        summary.green().to_string()
    } else {
        summary.yellow().to_string()
    });

    lines.join("\n")
}
