//! OHLCV bars and bar series.
//!
//! # Timestamp convention
//!
//! All timestamps are in **milliseconds since Unix epoch**, matching the
//! exchange kline format. A bar's `close_time` doubles as the natural
//! idempotency token when the series is published on the bus.

use std::ops::Deref;

use serde::{Deserialize, Serialize};

/// One OHLCV record for a fixed time bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: u64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: u64,
}

impl Candle {
    /// Check the bar invariants: `open_time < close_time`, `high` is the
    /// maximum and `low` the minimum of the four prices.
    pub fn is_valid(&self) -> bool {
        self.open_time < self.close_time
            && self.high >= self.open
            && self.high >= self.close
            && self.high >= self.low
            && self.low <= self.open
            && self.low <= self.close
    }
}

/// Ordered bars, ascending by `open_time`.
///
/// Refetched fresh on every poll; never persisted between polls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandleSeries(Vec<Candle>);

impl CandleSeries {
    pub fn new(bars: Vec<Candle>) -> Self {
        Self(bars)
    }

    /// Close time of the most recent bar, if any.
    pub fn last_close_time(&self) -> Option<u64> {
        self.0.last().map(|c| c.close_time)
    }

    /// Closing prices in series order.
    pub fn closes(&self) -> Vec<f64> {
        self.0.iter().map(|c| c.close).collect()
    }

    /// Drop the trailing bar if it has not closed yet at `now_ms`.
    pub fn trim_unclosed(&mut self, now_ms: u64) {
        if self.0.last().is_some_and(|c| now_ms < c.close_time) {
            self.0.pop();
        }
    }
}

impl Deref for CandleSeries {
    type Target = [Candle];

    fn deref(&self) -> &[Candle] {
        &self.0
    }
}

impl From<Vec<Candle>> for CandleSeries {
    fn from(bars: Vec<Candle>) -> Self {
        Self(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(open_time: u64, close: f64) -> Candle {
        Candle {
            open_time,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1.0,
            close_time: open_time + 59_999,
        }
    }

    #[test]
    fn validity() {
        assert!(bar(0, 10.0).is_valid());

        let mut inverted = bar(0, 10.0);
        inverted.high = 9.0;
        assert!(!inverted.is_valid());

        let mut backwards = bar(60_000, 10.0);
        backwards.close_time = 0;
        assert!(!backwards.is_valid());
    }

    #[test]
    fn trim_drops_only_open_bar() {
        let mut s = CandleSeries::new(vec![bar(0, 1.0), bar(60_000, 2.0)]);
        s.trim_unclosed(119_999);
        assert_eq!(s.len(), 2);
        s.trim_unclosed(100_000);
        assert_eq!(s.len(), 1);
        assert_eq!(s.last_close_time(), Some(59_999));
    }

    #[test]
    fn empty_series() {
        let s = CandleSeries::default();
        assert!(s.is_empty());
        assert_eq!(s.last_close_time(), None);
    }
}
