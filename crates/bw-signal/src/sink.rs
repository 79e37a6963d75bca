//! Terminal consumer that logs every signal.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bw_core::{ALL_SIGNALS, BusMessage, EventBus, Signal, Subscriber, SubscriberRef};
use chrono::{DateTime, Utc};
use tracing::info;

/// Epoch values above this are milliseconds, below it seconds.
const MS_CUTOFF: u64 = 10_000_000_000;

/// Render a signal as a short multi-line message.
///
/// ```text
/// trend_eth_1h
/// • ETHUSDT / 1h
/// • direction: UP
/// • strength: 0.2500
/// • price: 2012.50000000
/// • at: 2023-11-14 22:14:00 UTC
/// ```
pub fn format_signal(sig: &Signal) -> String {
    format!(
        "{}\n• {} / {}\n• direction: {}\n• strength: {:.4}\n• price: {:.8}\n• at: {}",
        sig.name,
        sig.instrument,
        sig.interval,
        sig.direction,
        sig.strength,
        sig.price,
        format_ts(sig.at),
    )
}

fn format_ts(at: u64) -> String {
    let ms = if at > MS_CUTOFF { at } else { at.saturating_mul(1000) };
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
}

/// Logs every signal matching a pattern (default `signal:*`).
pub struct SignalLogSink {
    bus: Arc<EventBus>,
    pattern: String,
    handle: Option<SubscriberRef>,
    delivered: Arc<AtomicU64>,
}

impl SignalLogSink {
    pub fn bind(bus: Arc<EventBus>) -> Self {
        Self::bind_pattern(bus, ALL_SIGNALS)
    }

    pub fn bind_pattern(bus: Arc<EventBus>, pattern: &str) -> Self {
        let delivered = Arc::new(AtomicU64::new(0));
        let handle = SubscriberRef::new(LogHandler {
            delivered: Arc::clone(&delivered),
        });
        bus.subscribe(pattern, handle.clone());
        Self {
            bus,
            pattern: pattern.to_string(),
            handle: Some(handle),
            delivered,
        }
    }

    /// Signals logged so far.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn unbind(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.bus.unsubscribe(&self.pattern, &handle);
        }
    }
}

struct LogHandler {
    delivered: Arc<AtomicU64>,
}

#[async_trait]
impl Subscriber for LogHandler {
    async fn on_message(&self, msg: BusMessage, msg_id: u64) -> anyhow::Result<()> {
        if let Some(sig) = msg.as_signal() {
            self.delivered.fetch_add(1, Ordering::Relaxed);
            info!("[sink] signal id={msg_id}\n{}", format_signal(sig));
        }
        Ok(())
    }
}
