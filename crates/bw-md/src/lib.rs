//! # bw-md
//!
//! Market data polling for the barwatch pipeline.
//!
//! ## Architecture
//!
//! A [`DataSource`] reports the exchange clock and serves closed bars. The
//! [`scheduler::Scheduler`] runs one polling loop per `(instrument, interval)`,
//! aligned to bar-close boundaries on the source's clock, and publishes each
//! fetched series on `ohlcv:{instrument}_{interval}`.
//!
//! - [`scheduler`]: aligned per-pair polling loops
//! - [`binance`]: Binance public kline REST client
//! - [`json_util`]: JSON parsing helpers

pub mod binance;
pub mod json_util;
pub mod scheduler;

use anyhow::Result;
use async_trait::async_trait;
use bw_core::CandleSeries;

/// Read-only access to an exchange's bars and clock.
///
/// Implementations are shared across every polling loop, so all methods take
/// `&self`.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Human-readable source name.
    fn name(&self) -> &str;

    /// Exchange server time in epoch milliseconds.
    async fn server_time(&self) -> Result<u64>;

    /// The latest `limit` bars for a pair, ascending by open time.
    ///
    /// With `trim_unclosed`, a trailing bar whose close time is still in the
    /// future (per server time) is dropped.
    async fn fetch_bars(
        &self,
        instrument: &str,
        interval: &str,
        limit: u32,
        trim_unclosed: bool,
    ) -> Result<CandleSeries>;
}
