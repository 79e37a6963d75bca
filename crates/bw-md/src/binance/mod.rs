//! Binance public kline source.
//!
//! # REST endpoints
//!
//! | Operation   | Method | Path            |
//! |-------------|--------|-----------------|
//! | Server time | GET    | `/api/v3/time`   |
//! | Klines      | GET    | `/api/v3/klines` |
//!
//! Both endpoints are unauthenticated. Kline rows are arrays of
//! `[openTime, "open", "high", "low", "close", "volume", closeTime, ...]`.

pub mod json_parser;

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use bw_core::CandleSeries;
use tracing::debug;

use crate::DataSource;
use crate::json_util::parse_u64_field;

/// Binance spot REST client for klines and server time.
pub struct BinanceKlineClient {
    /// Shared HTTP client.
    http: reqwest::Client,
    /// REST base URL (e.g. `https://api.binance.com`).
    base_url: String,
}

impl BinanceKlineClient {
    /// Create a client with a per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);
        let body = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {path} request failed"))?
            .error_for_status()
            .with_context(|| format!("GET {path} HTTP error"))?
            .json()
            .await
            .with_context(|| format!("GET {path} body is not JSON"))?;
        Ok(body)
    }
}

#[async_trait]
impl DataSource for BinanceKlineClient {
    fn name(&self) -> &str {
        "binance"
    }

    async fn server_time(&self) -> Result<u64> {
        let body = self.get_json("/api/v3/time", &[]).await?;
        parse_u64_field(&body, "serverTime").ok_or_else(|| anyhow!("serverTime not found in response"))
    }

    async fn fetch_bars(
        &self,
        instrument: &str,
        interval: &str,
        limit: u32,
        trim_unclosed: bool,
    ) -> Result<CandleSeries> {
        let query = [
            ("symbol", instrument.to_string()),
            ("interval", interval.to_string()),
            ("limit", limit.to_string()),
        ];
        let body = self.get_json("/api/v3/klines", &query).await?;
        let mut series = json_parser::parse_klines(&body)?;

        if trim_unclosed && !series.is_empty() {
            let now = self.server_time().await?;
            series.trim_unclosed(now);
        }

        debug!(
            "[binance-md] {instrument}-{interval}: {} bars, last close {:?}",
            series.len(),
            series.last_close_time(),
        );
        Ok(series)
    }
}
