//! Timestamp helpers shared by the queue and its output.

use chrono::{DateTime, DurationRound, SecondsFormat, TimeDelta, Utc};

/// Drop sub-millisecond precision so a timestamp survives a round-trip
/// through its RFC 3339 millisecond form unchanged.
#[must_use]
pub fn truncate_to_millis(t: DateTime<Utc>) -> DateTime<Utc> {
    t.duration_trunc(TimeDelta::milliseconds(1)).unwrap_or(t)
}

/// RFC 3339 with millisecond precision and a `Z` suffix,
/// e.g. `2024-03-01T09:00:00.123Z`.
#[must_use]
pub fn to_iso_millis(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Human-readable age of `then` relative to `now`.
#[must_use]
pub fn format_age(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now.signed_duration_since(then);
    if age.num_days() > 0 {
        format!("{} days ago", age.num_days())
    } else if age.num_hours() > 0 {
        format!("{} hours ago", age.num_hours())
    } else if age.num_minutes() > 0 {
        format!("{} minutes ago", age.num_minutes())
    } else {
        "just now".to_string()
    }
}
