//! Bar-close aligned polling.
//!
//! One tokio task per `(instrument, interval)`. Each cycle:
//!
//! ```text
//! server_time ─► sleep until ceil(now / D) * D + B ─► fetch_bars(trim_unclosed)
//!             ─► publish ohlcv:{instrument}_{interval} (id = last close time, dedupe)
//! ```
//!
//! Cycles of one pair are strictly sequential. A failed fetch or publish is
//! logged and the loop moves on to the next boundary. `stop()` flips a watch
//! flag, aborts every task and awaits them, so nothing publishes after it
//! returns.

use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use bw_core::config::{FeedConfig, PairSpec};
use bw_core::time_util::now_ms;
use bw_core::{BusMessage, BwError, BwResult, EventBus, Interval, ohlcv_topic};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::DataSource;

/// Per-scheduler polling knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Bars requested per fetch.
    pub limit: u32,
    /// Seconds past each bar boundary before fetching.
    pub buffer_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            limit: 200,
            buffer_seconds: 2,
        }
    }
}

impl From<&FeedConfig> for SchedulerConfig {
    fn from(feed: &FeedConfig) -> Self {
        Self {
            limit: feed.limit,
            buffer_seconds: feed.buffer_seconds,
        }
    }
}

/// Next fire time in epoch ms: the first bar boundary at or after `now_ms`,
/// plus the buffer. Saturates at `u64::MAX`.
#[inline]
pub fn next_fire_ms(now_ms: u64, interval_secs: u64, buffer_secs: u64) -> u64 {
    let d = interval_secs.max(1).saturating_mul(1000);
    now_ms
        .div_ceil(d)
        .saturating_mul(d)
        .saturating_add(buffer_secs.saturating_mul(1000))
}

/// Starts and stops the per-pair polling loops.
pub struct Scheduler {
    source: Arc<dyn DataSource>,
    bus: Arc<EventBus>,
    config: SchedulerConfig,
    stop_tx: watch::Sender<bool>,
    tasks: AHashMap<(String, String), JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(source: Arc<dyn DataSource>, bus: Arc<EventBus>, config: SchedulerConfig) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            source,
            bus,
            config,
            stop_tx,
            tasks: AHashMap::new(),
        }
    }

    /// Start polling one pair.
    ///
    /// Returns `Ok(false)` when the pair already has a running loop. A
    /// malformed interval or empty instrument is a configuration error and
    /// nothing is spawned.
    pub fn start(&mut self, instrument: &str, interval: &str) -> BwResult<bool> {
        let iv = validate_pair(instrument, interval)?;
        Ok(self.spawn_pair(instrument, iv))
    }

    /// Start every pair in `pairs`, skipping repeats and pairs already active.
    ///
    /// All pairs are validated before any loop is spawned. Returns the number
    /// of loops started.
    pub fn start_many(&mut self, pairs: impl Into<PairSpec>) -> BwResult<usize> {
        let pairs = pairs.into().pairs();
        let mut parsed = Vec::with_capacity(pairs.len());
        for (instrument, interval) in &pairs {
            parsed.push((instrument.as_str(), validate_pair(instrument, interval)?));
        }

        let mut started = 0;
        for (instrument, iv) in parsed {
            if self.spawn_pair(instrument, iv) {
                started += 1;
            }
        }
        Ok(started)
    }

    pub fn is_active(&self, instrument: &str, interval: &str) -> bool {
        let interval = Interval::parse(interval)
            .map_or_else(|_| interval.to_string(), |iv| iv.as_str().to_string());
        self.tasks
            .get(&(instrument.to_string(), interval))
            .is_some_and(|h| !h.is_finished())
    }

    /// Pairs with a running loop, sorted.
    pub fn active_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<_> = self
            .tasks
            .iter()
            .filter(|(_, h)| !h.is_finished())
            .map(|(k, _)| k.clone())
            .collect();
        pairs.sort();
        pairs
    }

    /// Stop every loop and wait for them to exit.
    ///
    /// The scheduler can be started again afterwards.
    pub async fn stop(&mut self) {
        self.stop_tx.send_replace(true);
        let tasks = std::mem::take(&mut self.tasks);
        let n = tasks.len();
        for ((instrument, interval), handle) in tasks {
            handle.abort();
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!("[scheduler] {instrument}-{interval} loop ended abnormally: {e}");
                }
            }
        }
        self.stop_tx = watch::channel(false).0;
        info!("[scheduler] stopped {n} loop(s)");
    }

    fn spawn_pair(&mut self, instrument: &str, interval: Interval) -> bool {
        let key = (instrument.to_string(), interval.as_str().to_string());
        if self.tasks.get(&key).is_some_and(|h| !h.is_finished()) {
            debug!("[scheduler] {}-{} already active", key.0, key.1);
            return false;
        }

        let poller = PairPoller {
            topic: ohlcv_topic(&key.0, &key.1),
            instrument: key.0.clone(),
            interval,
            source: Arc::clone(&self.source),
            bus: Arc::clone(&self.bus),
            config: self.config,
        };
        let stop_rx = self.stop_tx.subscribe();
        info!(
            "[scheduler] started {}-{} (limit={}, buffer={}s)",
            key.0, key.1, self.config.limit, self.config.buffer_seconds
        );
        self.tasks.insert(key, tokio::spawn(poller.run(stop_rx)));
        true
    }
}

fn validate_pair(instrument: &str, interval: &str) -> BwResult<Interval> {
    if instrument.trim().is_empty() {
        return Err(BwError::Config("instrument must not be empty".into()));
    }
    Interval::parse(interval)
}

// ---------------------------------------------------------------------------
// Per-pair loop
// ---------------------------------------------------------------------------

struct PairPoller {
    topic: String,
    instrument: String,
    interval: Interval,
    source: Arc<dyn DataSource>,
    bus: Arc<EventBus>,
    config: SchedulerConfig,
}

impl PairPoller {
    async fn run(self, mut stop_rx: watch::Receiver<bool>) {
        loop {
            if *stop_rx.borrow() {
                break;
            }

            let now = match self.source.server_time().await {
                Ok(t) => t,
                Err(e) => {
                    warn!(
                        "[scheduler] {}: server time unavailable, using local clock: {e:#}",
                        self.topic
                    );
                    now_ms()
                }
            };
            let fire = next_fire_ms(now, self.interval.seconds(), self.config.buffer_seconds);
            let wait = Duration::from_millis(fire.saturating_sub(now));

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = stop_rx.changed() => break,
            }

            self.poll_once().await;
        }
        debug!("[scheduler] {} loop exited", self.topic);
    }

    async fn poll_once(&self) {
        let series = match self
            .source
            .fetch_bars(&self.instrument, self.interval.as_str(), self.config.limit, true)
            .await
        {
            Ok(s) => s,
            Err(e) => {
                let err = BwError::Fetch(format!("{e:#}"));
                warn!("[scheduler] {}: {err}", self.topic);
                return;
            }
        };

        let Some(close_time) = series.last_close_time() else {
            debug!("[scheduler] {}: empty series, skipping", self.topic);
            return;
        };

        if let Err(e) = self
            .bus
            .publish(&self.topic, BusMessage::bars(series), Some(close_time), true)
            .await
        {
            warn!("[scheduler] {}: publish failed: {e}", self.topic);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use bw_core::{Candle, CandleSeries, SubscriberRef};
    use tokio::time::{Instant, sleep};

    use super::*;

    /// 2023-11-14T22:14:00Z, on a minute boundary.
    const BASE_MS: u64 = 1_700_000_040_000;

    /// Source whose clock follows tokio's (paused) test clock.
    struct FakeSource {
        origin: Instant,
        fetches: AtomicUsize,
        fail_fetch: AtomicBool,
        frozen: bool,
    }

    impl FakeSource {
        fn new(frozen: bool) -> Arc<Self> {
            Arc::new(Self {
                origin: Instant::now(),
                fetches: AtomicUsize::new(0),
                fail_fetch: AtomicBool::new(false),
                frozen,
            })
        }

        fn now(&self) -> u64 {
            BASE_MS + self.origin.elapsed().as_millis() as u64
        }
    }

    #[async_trait]
    impl DataSource for FakeSource {
        fn name(&self) -> &str {
            "fake"
        }

        async fn server_time(&self) -> Result<u64> {
            Ok(self.now())
        }

        async fn fetch_bars(
            &self,
            _instrument: &str,
            interval: &str,
            _limit: u32,
            _trim_unclosed: bool,
        ) -> Result<CandleSeries> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail_fetch.load(Ordering::SeqCst) {
                return Err(anyhow!("exchange unavailable"));
            }
            let d = Interval::parse(interval)?.millis();
            let boundary = if self.frozen { BASE_MS } else { self.now() / d * d };
            Ok(CandleSeries::new(vec![Candle {
                open_time: boundary - d,
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 1.0,
                close_time: boundary - 1,
            }]))
        }
    }

    fn setup(source: Arc<FakeSource>, topic: &str) -> (Scheduler, Arc<AtomicUsize>) {
        let bus = Arc::new(EventBus::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        bus.subscribe(
            topic,
            SubscriberRef::from_fn(move |_msg, _id| {
                let h = Arc::clone(&h);
                async move {
                    h.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        );
        let config = SchedulerConfig {
            limit: 10,
            buffer_seconds: 1,
        };
        (Scheduler::new(source, bus, config), hits)
    }

    #[test]
    fn fire_time_alignment() {
        assert_eq!(next_fire_ms(BASE_MS, 60, 2), BASE_MS + 2_000);
        assert_eq!(next_fire_ms(BASE_MS + 1, 60, 2), BASE_MS + 62_000);
        assert_eq!(next_fire_ms(BASE_MS + 59_999, 60, 0), BASE_MS + 60_000);
        assert_eq!(next_fire_ms(0, 3600, 0), 0);
    }

    #[test]
    fn fire_time_saturates() {
        assert_eq!(next_fire_ms(BASE_MS, 60, u64::MAX), u64::MAX);
        assert_eq!(next_fire_ms(u64::MAX - 5, 60, 2), u64::MAX);
        assert_eq!(next_fire_ms(BASE_MS, u64::MAX, 0), u64::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn padded_interval_polls_canonical_topic() {
        let source = FakeSource::new(false);
        let (mut sched, hits) = setup(Arc::clone(&source), "ohlcv:BTCUSDT_1m");

        assert!(sched.start("BTCUSDT", " 1m ").unwrap());
        assert!(!sched.start("BTCUSDT", "1m").unwrap());
        assert_eq!(sched.active_pairs(), vec![("BTCUSDT".to_string(), "1m".to_string())]);
        assert!(sched.is_active("BTCUSDT", "1m "));

        sleep(Duration::from_secs(5)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        sched.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn polls_each_boundary_once() {
        let source = FakeSource::new(false);
        let (mut sched, hits) = setup(Arc::clone(&source), "ohlcv:BTCUSDT_1m");

        assert!(sched.start("BTCUSDT", "1m").unwrap());
        assert!(!sched.start("BTCUSDT", "1m").unwrap());
        assert!(sched.is_active("BTCUSDT", "1m"));

        // fires at +1s, +61s, +121s, +181s
        sleep(Duration::from_secs(185)).await;
        assert_eq!(source.fetches.load(Ordering::SeqCst), 4);
        assert_eq!(hits.load(Ordering::SeqCst), 4);

        sched.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_failure_skips_cycle() {
        let source = FakeSource::new(false);
        source.fail_fetch.store(true, Ordering::SeqCst);
        let (mut sched, hits) = setup(Arc::clone(&source), "ohlcv:BTCUSDT_1m");
        sched.start("BTCUSDT", "1m").unwrap();

        sleep(Duration::from_secs(65)).await;
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(sched.is_active("BTCUSDT", "1m"));

        source.fail_fetch.store(false, Ordering::SeqCst);
        sleep(Duration::from_secs(60)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        sched.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_publishing() {
        let source = FakeSource::new(false);
        let (mut sched, hits) = setup(Arc::clone(&source), "ohlcv:BTCUSDT_1m");
        sched.start("BTCUSDT", "1m").unwrap();

        sleep(Duration::from_secs(65)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        sched.stop().await;
        assert!(sched.active_pairs().is_empty());

        sleep(Duration::from_secs(600)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);

        // restartable
        assert!(sched.start("BTCUSDT", "1m").unwrap());
        sched.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_series_is_deduped() {
        let source = FakeSource::new(true);
        let (mut sched, hits) = setup(Arc::clone(&source), "ohlcv:BTCUSDT_1m");
        sched.start("BTCUSDT", "1m").unwrap();

        sleep(Duration::from_secs(125)).await;
        assert_eq!(source.fetches.load(Ordering::SeqCst), 3);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        sched.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn start_many_dedups_pairs() {
        let source = FakeSource::new(false);
        let (mut sched, _hits) = setup(source, "ohlcv:BTCUSDT_1m");

        let mut map = BTreeMap::new();
        map.insert("BTCUSDT".to_string(), vec!["1m".to_string(), "1m".to_string()]);
        map.insert("ETHUSDT".to_string(), vec!["1h".to_string()]);
        assert_eq!(sched.start_many(map).unwrap(), 2);

        let list = vec![
            ("BTCUSDT".to_string(), "1m".to_string()),
            ("ETHUSDT".to_string(), "4h".to_string()),
        ];
        assert_eq!(sched.start_many(list).unwrap(), 1);
        assert_eq!(
            sched.active_pairs(),
            vec![
                ("BTCUSDT".to_string(), "1m".to_string()),
                ("ETHUSDT".to_string(), "1h".to_string()),
                ("ETHUSDT".to_string(), "4h".to_string()),
            ]
        );

        sched.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn bad_pairs_fail_fast() {
        let source = FakeSource::new(false);
        let (mut sched, _hits) = setup(source, "ohlcv:BTCUSDT_1m");

        assert!(matches!(sched.start("BTCUSDT", "1x"), Err(BwError::Config(_))));
        assert!(matches!(sched.start(" ", "1m"), Err(BwError::Config(_))));

        let list = vec![
            ("BTCUSDT".to_string(), "1m".to_string()),
            ("ETHUSDT".to_string(), "0h".to_string()),
        ];
        assert!(sched.start_many(list).is_err());
        assert!(sched.active_pairs().is_empty());
    }
}
