//! Queue status summary for indicators and `offsync status`.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::manager::SyncStatus;

/// Point-in-time view of the manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    /// Whether the backend is believed reachable
    pub is_online: bool,
    /// Number of queued items
    pub pending: usize,
    /// Queued items past the retry ceiling
    pub exhausted: usize,
    /// Current sync status
    pub sync_status: SyncStatus,
    /// Enqueue time of the oldest queued item
    pub oldest: Option<DateTime<Utc>>,
}

impl QueueStatus {
    /// One-line indicator text.
    ///
    /// Offline wins over everything else, then an in-flight pass, then a
    /// failed one.
    #[must_use]
    pub fn banner(&self) -> String {
        if !self.is_online {
            return format!("Offline - {} pending", self.pending);
        }
        match self.sync_status {
            SyncStatus::Syncing => "Syncing...".to_string(),
            SyncStatus::Error => "Sync failed - Retry".to_string(),
            SyncStatus::Idle if self.pending > 0 => format!("{} pending", self.pending),
            SyncStatus::Idle => "All changes synced".to_string(),
        }
    }

    /// Whether an indicator should be shown at all.
    #[must_use]
    pub const fn needs_attention(&self) -> bool {
        !self.is_online || self.pending > 0 || !matches!(self.sync_status, SyncStatus::Idle)
    }
}
