//! Core abstractions for offsync.
//!
//! Time handling shared across the queue, its persistence and its output.

mod clock;
mod datetime;

#[cfg(test)]
pub use clock::ManualClock;
pub use clock::{Clock, SystemClock};
pub use datetime::{format_age, to_iso_millis, truncate_to_millis};
