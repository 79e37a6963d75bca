//! Configuration parsing for the barwatch pipeline.
//!
//! The runner reads a single JSON config file: logging metadata, feed
//! settings, the `(instrument, interval)` pairs to poll, and the detectors to
//! bind.
//!
//! # Example config
//!
//! ```json
//! {
//!   "app": { "module_name": "barwatch", "log_path": "/tmp/log" },
//!   "feed": { "limit": 200, "buffer_seconds": 2 },
//!   "pairs": { "BTCUSDT": ["1m"], "ETHUSDT": ["1h", "4h"] },
//!   "detectors": [
//!     { "kind": "trend", "name": "trend_eth_1h", "instrument": "ETHUSDT", "interval": "1h" },
//!     { "kind": "ema_cross", "name": "ema_btc_1m", "instrument": "BTCUSDT", "interval": "1m",
//!       "short_window": 9, "long_window": 21 }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;

use anyhow::Context;
use serde::Deserialize;

use crate::dedup::DEFAULT_DEDUPE_WINDOW;
use crate::error::BwError;
use crate::types::Interval;

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Module metadata (name, log path).
    #[serde(default)]
    pub app: ModuleMeta,

    /// Polling and bus settings.
    #[serde(default)]
    pub feed: FeedConfig,

    /// Pairs to poll in addition to those the detectors need.
    #[serde(default)]
    pub pairs: PairSpec,

    /// Detectors to bind to the bus.
    #[serde(default)]
    pub detectors: Vec<DetectorConfig>,
}

impl AppConfig {
    /// Semantic checks serde cannot express. Fails on the first problem.
    pub fn validate(&self) -> Result<(), BwError> {
        self.feed.validate()?;
        for (instrument, interval) in self.pairs.pairs() {
            if instrument.trim().is_empty() {
                return Err(BwError::Config("empty instrument in pairs".into()));
            }
            Interval::parse(&interval)?;
        }
        for det in &self.detectors {
            det.validate()?;
        }
        Ok(())
    }

    /// Every pair to poll: configured pairs first, then detector pairs, each
    /// once. Intervals are in canonical form.
    pub fn all_pairs(&self) -> Vec<(String, String)> {
        let configured = self.pairs.pairs();
        let detector_pairs = self
            .detectors
            .iter()
            .map(|det| det.target())
            .map(|t| (t.instrument.clone(), t.interval.clone()));

        let mut pairs: Vec<(String, String)> = Vec::new();
        for (instrument, interval) in configured.into_iter().chain(detector_pairs) {
            let interval = Interval::parse(&interval)
                .map_or(interval, |iv| iv.as_str().to_string());
            let pair = (instrument, interval);
            if !pairs.contains(&pair) {
                pairs.push(pair);
            }
        }
        pairs
    }

    pub fn module_name(&self) -> String {
        self.app.module_name.clone().unwrap_or_else(|| "barwatch".into())
    }
}

/// Module metadata block.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModuleMeta {
    pub module_name: Option<String>,
    pub log_path: Option<String>,
    /// Write the log file as JSON lines.
    #[serde(default)]
    pub log_json: bool,
}

/// Most bars the kline endpoint returns per request.
pub const MAX_FETCH_LIMIT: u32 = 1000;

/// Longest wait past a bar close before polling (one day).
pub const MAX_BUFFER_SECONDS: u64 = 86_400;

/// Feed (scheduler + data source + bus) settings.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// REST base URL of the kline source.
    #[serde(default = "default_rest_url")]
    pub rest_url: String,

    /// Bars fetched per poll.
    #[serde(default = "default_limit")]
    pub limit: u32,

    /// Seconds to wait past each bar close before polling.
    #[serde(default = "default_buffer_seconds")]
    pub buffer_seconds: u64,

    /// Capacity of the bus dedupe window.
    #[serde(default = "default_dedupe_window")]
    pub dedupe_window: usize,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl FeedConfig {
    fn validate(&self) -> Result<(), BwError> {
        if self.limit == 0 || self.limit > MAX_FETCH_LIMIT {
            return Err(BwError::Config(format!(
                "feed.limit must be in 1..={MAX_FETCH_LIMIT}, got {}",
                self.limit
            )));
        }
        if self.buffer_seconds > MAX_BUFFER_SECONDS {
            return Err(BwError::Config(format!(
                "feed.buffer_seconds must be at most {MAX_BUFFER_SECONDS}, got {}",
                self.buffer_seconds
            )));
        }
        if self.dedupe_window == 0 {
            return Err(BwError::Config("feed.dedupe_window must be at least 1".into()));
        }
        Ok(())
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            rest_url: default_rest_url(),
            limit: default_limit(),
            buffer_seconds: default_buffer_seconds(),
            dedupe_window: default_dedupe_window(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// `(instrument, interval)` pairs, written either as a list of pairs or as a
/// `{instrument: [intervals]}` mapping.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PairSpec {
    List(Vec<(String, String)>),
    Map(BTreeMap<String, Vec<String>>),
}

impl PairSpec {
    /// Flatten to pairs, dropping repeats but keeping first-seen order.
    pub fn pairs(&self) -> Vec<(String, String)> {
        let flat: Vec<(String, String)> = match self {
            Self::List(list) => list.clone(),
            Self::Map(map) => map
                .iter()
                .flat_map(|(sym, ivs)| ivs.iter().map(move |iv| (sym.clone(), iv.clone())))
                .collect(),
        };
        let mut out: Vec<(String, String)> = Vec::with_capacity(flat.len());
        for pair in flat {
            if !out.contains(&pair) {
                out.push(pair);
            }
        }
        out
    }
}

impl Default for PairSpec {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl From<Vec<(String, String)>> for PairSpec {
    fn from(list: Vec<(String, String)>) -> Self {
        Self::List(list)
    }
}

impl From<BTreeMap<String, Vec<String>>> for PairSpec {
    fn from(map: BTreeMap<String, Vec<String>>) -> Self {
        Self::Map(map)
    }
}

// ---------------------------------------------------------------------------
// Detectors
// ---------------------------------------------------------------------------

/// One detector entry, discriminated by `kind`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectorConfig {
    EmaCross {
        #[serde(flatten)]
        target: DetectorTarget,
        #[serde(flatten)]
        params: EmaCrossParams,
    },
    Trend {
        #[serde(flatten)]
        target: DetectorTarget,
        #[serde(flatten)]
        params: TrendParams,
    },
}

impl DetectorConfig {
    pub fn target(&self) -> &DetectorTarget {
        match self {
            Self::EmaCross { target, .. } | Self::Trend { target, .. } => target,
        }
    }

    pub fn validate(&self) -> Result<(), BwError> {
        self.target().validate()?;
        match self {
            Self::EmaCross { params, .. } => params.validate(),
            Self::Trend { params, .. } => params.validate(),
        }
    }
}

/// Which detector this is and which bars it watches.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DetectorTarget {
    pub name: String,
    pub instrument: String,
    pub interval: String,
}

impl DetectorTarget {
    pub fn new(name: &str, instrument: &str, interval: &str) -> Self {
        Self {
            name: name.into(),
            instrument: instrument.into(),
            interval: interval.into(),
        }
    }

    pub fn validate(&self) -> Result<(), BwError> {
        if self.name.trim().is_empty() {
            return Err(BwError::Config("detector name is empty".into()));
        }
        if self.instrument.trim().is_empty() {
            return Err(BwError::Config(format!("detector '{}': empty instrument", self.name)));
        }
        Interval::parse(&self.interval)?;
        Ok(())
    }

    /// Validated copy with the interval in its canonical form, so topics
    /// built from it match the ones the scheduler publishes on.
    pub fn canonical(&self) -> Result<Self, BwError> {
        self.validate()?;
        Ok(Self {
            interval: Interval::parse(&self.interval)?.as_str().to_string(),
            ..self.clone()
        })
    }
}

/// EMA-cross thresholds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EmaCrossParams {
    #[serde(default = "default_short_window")]
    pub short_window: usize,
    #[serde(default = "default_long_window")]
    pub long_window: usize,
}

impl EmaCrossParams {
    pub fn validate(&self) -> Result<(), BwError> {
        check_window("short_window", self.short_window)?;
        check_window("long_window", self.long_window)
    }
}

impl Default for EmaCrossParams {
    fn default() -> Self {
        Self {
            short_window: default_short_window(),
            long_window: default_long_window(),
        }
    }
}

/// Trend detector thresholds (EMA cross + volatility + hysteresis).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrendParams {
    #[serde(default = "default_short_window")]
    pub short_window: usize,
    #[serde(default = "default_long_window")]
    pub long_window: usize,
    /// Wilder ATR window (slow volatility).
    #[serde(default = "default_atr_window")]
    pub atr_window: usize,
    /// EWM span of the true range (fast volatility).
    #[serde(default = "default_fast_tr_window")]
    pub fast_tr_window: usize,
    /// `fast_tr / atr` must exceed this to confirm volatility.
    #[serde(default = "default_ratio_threshold")]
    pub ratio_threshold: f64,
    /// Minimum `|short - long| / |long|` to accept a crossing.
    #[serde(default = "default_hysteresis_threshold")]
    pub hysteresis_threshold: f64,
    /// Trailing bars scanned for coincident confirmation.
    #[serde(default = "default_confirmation_window")]
    pub confirmation_window: usize,
}

impl TrendParams {
    pub fn validate(&self) -> Result<(), BwError> {
        check_window("short_window", self.short_window)?;
        check_window("long_window", self.long_window)?;
        check_window("atr_window", self.atr_window)?;
        check_window("fast_tr_window", self.fast_tr_window)?;
        check_window("confirmation_window", self.confirmation_window)?;
        check_threshold("ratio_threshold", self.ratio_threshold)?;
        check_threshold("hysteresis_threshold", self.hysteresis_threshold)
    }

    /// Largest indicator window.
    pub fn max_window(&self) -> usize {
        self.short_window
            .max(self.long_window)
            .max(self.atr_window)
            .max(self.fast_tr_window)
    }
}

impl Default for TrendParams {
    fn default() -> Self {
        Self {
            short_window: default_short_window(),
            long_window: default_long_window(),
            atr_window: default_atr_window(),
            fast_tr_window: default_fast_tr_window(),
            ratio_threshold: default_ratio_threshold(),
            hysteresis_threshold: default_hysteresis_threshold(),
            confirmation_window: default_confirmation_window(),
        }
    }
}

fn check_window(name: &str, value: usize) -> Result<(), BwError> {
    if value == 0 {
        return Err(BwError::Config(format!("{name} must be at least 1")));
    }
    Ok(())
}

fn check_threshold(name: &str, value: f64) -> Result<(), BwError> {
    if !value.is_finite() || value < 0.0 {
        return Err(BwError::Config(format!("{name} must be a finite non-negative number, got {value}")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Defaults (used by serde)
// ---------------------------------------------------------------------------

fn default_rest_url() -> String {
    "https://api.binance.com".into()
}

fn default_limit() -> u32 {
    200
}

fn default_buffer_seconds() -> u64 {
    2
}

fn default_dedupe_window() -> usize {
    DEFAULT_DEDUPE_WINDOW
}

fn default_request_timeout() -> u64 {
    10
}

fn default_short_window() -> usize {
    7
}

fn default_long_window() -> usize {
    25
}

fn default_atr_window() -> usize {
    14
}

fn default_fast_tr_window() -> usize {
    3
}

fn default_ratio_threshold() -> f64 {
    1.2
}

fn default_hysteresis_threshold() -> f64 {
    0.002
}

fn default_confirmation_window() -> usize {
    5
}

/// Parse and validate a JSON config string.
pub fn parse_config(content: &str) -> anyhow::Result<AppConfig> {
    let config: AppConfig = serde_json::from_str(content)
        .map_err(|e| BwError::Config(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

/// Load, parse and validate a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    parse_config(&content)
}
