//! Topic naming.
//!
//! Formats (bit-exact):
//! - OHLCV : `ohlcv:{instrument}_{interval}`
//! - Signal: `signal:{instrument}_{interval}`

/// Wildcard marker inside a subscription pattern.
pub const WILDCARD: char = '*';

/// Pattern matching every signal topic.
pub const ALL_SIGNALS: &str = "signal:*";

/// Topic carrying freshly fetched bar series.
pub fn ohlcv_topic(instrument: &str, interval: &str) -> String {
    format!("ohlcv:{instrument}_{interval}")
}

/// Topic carrying detector output.
pub fn signal_topic(instrument: &str, interval: &str) -> String {
    format!("signal:{instrument}_{interval}")
}

/// Whether a subscription key is a wildcard pattern rather than a plain topic.
#[inline]
pub fn is_pattern(key: &str) -> bool {
    key.contains(WILDCARD)
}
