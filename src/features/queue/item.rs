//! Queue item types.
//!
//! A [`QueueItem`] is one deferred mutation waiting to reach the backend.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Kind of mutation a queue item carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Create a new record
    Create,
    /// Update an existing record
    Update,
    /// Delete a record
    Delete,
}

impl OperationKind {
    /// Get the display name for this operation kind.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Delete => "Delete",
        }
    }

    /// Wire name, as used in the persisted queue and on the command line.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Parse a wire name (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    /// Whether the backend call needs the target record id.
    #[must_use]
    pub const fn targets_existing(&self) -> bool {
        matches!(self, Self::Update | Self::Delete)
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// A queued mutation with metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    /// Unique id, `<millis>-<base36 suffix>`
    pub id: String,
    /// What to do
    pub operation_kind: OperationKind,
    /// Target resource, e.g. "lead" or "deal"
    pub entity_kind: String,
    /// Forwarded verbatim to the backend
    pub payload: serde_json::Value,
    /// When the item was queued
    #[serde(with = "iso_millis")]
    pub enqueued_at: DateTime<Utc>,
    /// Failed delivery attempts so far, capped at the retry ceiling
    pub retry_count: u32,
    /// Message from the most recent failed attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl QueueItem {
    /// Create a fresh item stamped at `now`.
    #[must_use]
    pub fn new(
        operation_kind: OperationKind,
        entity_kind: impl Into<String>,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: generate_id(now),
            operation_kind,
            entity_kind: entity_kind.into(),
            payload,
            enqueued_at: now,
            retry_count: 0,
            last_error: None,
        }
    }

    /// Id of the backend record this item targets, read from `payload.id`.
    ///
    /// Accepts both string and numeric ids.
    #[must_use]
    pub fn target_id(&self) -> Option<String> {
        match self.payload.get("id")? {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Whether automatic retries are used up.
    #[must_use]
    pub const fn is_exhausted(&self, ceiling: u32) -> bool {
        self.retry_count >= ceiling
    }

    /// Record a failed attempt. The count stops at `ceiling`.
    pub fn record_failure(&mut self, error: impl Into<String>, ceiling: u32) {
        if self.retry_count < ceiling {
            self.retry_count += 1;
        }
        self.last_error = Some(error.into());
    }
}

/// `DateTime<Utc>` as an RFC 3339 string with millisecond precision.
mod iso_millis {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::core::to_iso_millis;

    pub fn serialize<S: Serializer>(t: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&to_iso_millis(t))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Build an id from the enqueue time and a random base36 suffix.
#[must_use]
pub fn generate_id(now: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .filter_map(|_| std::char::from_digit(rng.gen_range(0..36), 36))
        .collect();
    format!("{}-{suffix}", now.timestamp_millis())
}
