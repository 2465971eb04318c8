//! Epoch-millisecond timestamps.
//!
//! All durable records carry epoch milliseconds. Server-side ordering never
//! trusts client clocks; the store assigns message timestamps itself.

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub type EpochMillis = u64;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> EpochMillis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
