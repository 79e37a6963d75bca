//! Wall-clock helpers.
//!
//! The scheduler aligns to the data source's clock; local time is only a
//! fallback when the source cannot report its own.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as **milliseconds** since Unix epoch.
#[inline]
pub fn now_ms() -> u64 {
    let d = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    d.as_millis() as u64
}
