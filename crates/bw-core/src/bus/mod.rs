//! Topic-based event bus.
//!
//! Subscribers register under a plain topic (`ohlcv:BTCUSDT_1m`) or a
//! wildcard pattern (`signal:*`). A publish fans out to the union of every
//! matching subscriber, running them concurrently and returning once all of
//! them have finished.
//!
//! # Message ids and dedupe
//!
//! Each publish carries a `u64` message id, either caller-supplied (a bar's
//! close time) or allocated from a bus-wide monotonic counter. With
//! `dedupe = true`, a `(topic, id)` pair already in the [`DedupWindow`] is
//! dropped without delivery. The pair is recorded only after the dispatch
//! attempt completes, whether or not subscribers failed.
//!
//! # Locking
//!
//! ```text
//! subs   : DashMap<key, set<SubscriberRef>>   concurrent reads + writes
//! globs  : DashMap<pattern, Glob>             compile cache
//! state  : Mutex<{next_id, DedupWindow}>      single ordering lock
//! ```

mod message;
mod pattern;
mod subscriber;

use std::panic::AssertUnwindSafe;

use ahash::AHashSet;
use dashmap::DashMap;
use futures_util::FutureExt;
use futures_util::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::dedup::{DEFAULT_DEDUPE_WINDOW, DedupWindow};
use crate::error::{BwError, BwResult};
use crate::types::is_pattern;

pub use message::BusMessage;
pub use pattern::Glob;
pub use subscriber::{Subscriber, SubscriberRef};

/// State guarded by the bus-wide ordering lock.
struct BusState {
    next_id: u64,
    seen: DedupWindow,
}

/// Topic/pattern pub/sub bus with duplicate suppression.
///
/// Constructed once by the composition root and shared as `Arc<EventBus>`.
/// `subscribe`, `unsubscribe` and `publish` may be called concurrently from
/// independent tasks.
pub struct EventBus {
    subs: DashMap<String, AHashSet<SubscriberRef>>,
    globs: DashMap<String, Glob>,
    state: Mutex<BusState>,
}

impl EventBus {
    /// Create a bus with the default dedupe window (8192 pairs).
    pub fn new() -> Self {
        Self::with_dedupe_window(DEFAULT_DEDUPE_WINDOW)
    }

    /// Create a bus remembering at most `capacity` `(topic, id)` pairs.
    pub fn with_dedupe_window(capacity: usize) -> Self {
        Self {
            subs: DashMap::new(),
            globs: DashMap::new(),
            state: Mutex::new(BusState {
                next_id: 1,
                seen: DedupWindow::new(capacity),
            }),
        }
    }

    /// Register `subscriber` under a topic or pattern. Idempotent.
    pub fn subscribe(&self, topic_or_pattern: &str, subscriber: SubscriberRef) {
        let added = self
            .subs
            .entry(topic_or_pattern.to_string())
            .or_default()
            .insert(subscriber);
        if added {
            debug!("[bus] subscribed to '{topic_or_pattern}'");
        }
    }

    /// Remove `subscriber` from a key. The key is dropped once its set is
    /// empty, and any cached pattern compilation for it is invalidated.
    pub fn unsubscribe(&self, topic_or_pattern: &str, subscriber: &SubscriberRef) {
        let mut now_empty = false;
        if let Some(mut set) = self.subs.get_mut(topic_or_pattern) {
            set.remove(subscriber);
            now_empty = set.is_empty();
        }
        if now_empty {
            self.subs.remove_if(topic_or_pattern, |_, set| set.is_empty());
        }
        self.globs.remove(topic_or_pattern);
    }

    /// Number of subscribers registered under exactly this key.
    pub fn subscriber_count(&self, topic_or_pattern: &str) -> usize {
        self.subs.get(topic_or_pattern).map_or(0, |set| set.len())
    }

    /// Whether `(topic, msg_id)` is currently inside the dedupe window.
    pub async fn is_seen(&self, topic: &str, msg_id: u64) -> bool {
        self.state.lock().await.seen.contains(topic, msg_id)
    }

    /// Deliver `msg` to every subscriber matching `topic`.
    ///
    /// Returns the message id used (allocated when `msg_id` is `None`).
    /// Subscriber failures are logged and never surface here; the only error
    /// is an unpublishable topic.
    pub async fn publish(
        &self,
        topic: &str,
        msg: BusMessage,
        msg_id: Option<u64>,
        dedupe: bool,
    ) -> BwResult<u64> {
        if is_pattern(topic) {
            return Err(BwError::Publish(format!(
                "cannot publish to pattern '{topic}'"
            )));
        }

        let msg_id = match msg_id {
            Some(id) => id,
            None => self.next_msg_id().await,
        };

        if dedupe && self.state.lock().await.seen.contains(topic, msg_id) {
            debug!("[bus] duplicate '{topic}' id={msg_id} suppressed");
            return Ok(msg_id);
        }

        let targets = self.matching(topic);
        if !targets.is_empty() {
            let calls = targets.iter().map(|sub| {
                let msg = msg.clone();
                AssertUnwindSafe(sub.call(msg, msg_id)).catch_unwind()
            });
            for result in join_all(calls).await {
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("[bus] subscriber error on '{topic}' id={msg_id}: {e:#}"),
                    Err(_) => error!("[bus] subscriber panicked on '{topic}' id={msg_id}"),
                }
            }
        }

        if dedupe {
            self.state.lock().await.seen.insert(topic, msg_id);
        }
        Ok(msg_id)
    }

    async fn next_msg_id(&self) -> u64 {
        let mut state = self.state.lock().await;
        let id = state.next_id;
        state.next_id += 1;
        id
    }

    /// Union of subscribers whose key equals `topic` or whose pattern matches it.
    fn matching(&self, topic: &str) -> AHashSet<SubscriberRef> {
        let mut out = AHashSet::new();
        for entry in self.subs.iter() {
            let key = entry.key();
            let hit = if is_pattern(key) {
                self.globs
                    .entry(key.clone())
                    .or_insert_with(|| Glob::compile(key))
                    .matches(topic)
            } else {
                key == topic
            };
            if hit {
                out.extend(entry.value().iter().cloned());
            }
        }
        out
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use anyhow::anyhow;
    use tokio::sync::Barrier;

    use super::*;
    use crate::types::{CandleSeries, Direction, Signal};

    fn counter() -> (Arc<AtomicUsize>, SubscriberRef) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let sub = SubscriberRef::from_fn(move |_msg, _id| {
            let h = Arc::clone(&h);
            async move {
                h.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        (hits, sub)
    }

    fn empty_bars() -> BusMessage {
        BusMessage::bars(CandleSeries::default())
    }

    fn signal_msg() -> BusMessage {
        BusMessage::Signal(Signal {
            name: "t".into(),
            instrument: "BTCUSDT".into(),
            interval: "1m".into(),
            direction: Direction::Up,
            strength: 1.0,
            at: 1,
            price: 1.0,
        })
    }

    #[tokio::test]
    async fn dedupe_delivers_once() {
        let bus = EventBus::new();
        let (hits, sub) = counter();
        bus.subscribe("ohlcv:BTCUSDT_1m", sub);

        let first = bus
            .publish("ohlcv:BTCUSDT_1m", empty_bars(), Some(42), true)
            .await
            .unwrap();
        let second = bus
            .publish("ohlcv:BTCUSDT_1m", empty_bars(), Some(42), true)
            .await
            .unwrap();

        assert_eq!((first, second), (42, 42));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(bus.is_seen("ohlcv:BTCUSDT_1m", 42).await);
    }

    #[tokio::test]
    async fn without_dedupe_every_publish_delivers() {
        let bus = EventBus::new();
        let (hits, sub) = counter();
        bus.subscribe("t", sub);
        bus.publish("t", empty_bars(), Some(7), false).await.unwrap();
        bus.publish("t", empty_bars(), Some(7), false).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn wildcard_matches_signal_topics_only() {
        let bus = EventBus::new();
        let (hits, sub) = counter();
        bus.subscribe("signal:*", sub);

        bus.publish("signal:BTCUSDT_1m", signal_msg(), None, false).await.unwrap();
        bus.publish("signal:ETHUSDT_1h", signal_msg(), None, false).await.unwrap();
        bus.publish("ohlcv:BTCUSDT_1m", empty_bars(), None, false).await.unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn evicted_pair_is_delivered_again() {
        let bus = EventBus::with_dedupe_window(2);
        let (hits, sub) = counter();
        bus.subscribe("t", sub);

        for id in 1..=3 {
            bus.publish("t", empty_bars(), Some(id), true).await.unwrap();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 3);

        // (t, 1) fell out of the window when (t, 3) was recorded.
        bus.publish("t", empty_bars(), Some(1), true).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 4);
        // (t, 3) is still inside it.
        bus.publish("t", empty_bars(), Some(3), true).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn failing_subscriber_is_isolated() {
        let bus = EventBus::new();
        let failing = SubscriberRef::from_fn(|_msg, _id| async { Err(anyhow!("boom")) });
        let panicking = SubscriberRef::from_fn(|_msg, _id| async {
            if true {
                panic!("kaboom");
            }
            Ok(())
        });
        let (hits, ok) = counter();
        bus.subscribe("t", failing);
        bus.subscribe("t", panicking);
        bus.subscribe("t", ok);

        let id = bus.publish("t", empty_bars(), Some(5), true).await;
        assert_eq!(id.unwrap(), 5);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        // marked seen even though some subscribers failed
        assert!(bus.is_seen("t", 5).await);
    }

    #[tokio::test]
    async fn same_handle_under_two_keys_runs_once() {
        let bus = EventBus::new();
        let (hits, sub) = counter();
        bus.subscribe("signal:*", sub.clone());
        bus.subscribe("signal:BTCUSDT_1m", sub.clone());
        bus.subscribe("signal:BTCUSDT_1m", sub);

        assert_eq!(bus.subscriber_count("signal:BTCUSDT_1m"), 1);
        bus.publish("signal:BTCUSDT_1m", signal_msg(), None, false).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unsubscribe_drops_empty_key() {
        let bus = EventBus::new();
        let (hits, sub) = counter();
        bus.subscribe("signal:*", sub.clone());
        bus.publish("signal:X_1m", signal_msg(), None, false).await.unwrap();

        bus.unsubscribe("signal:*", &sub);
        assert_eq!(bus.subscriber_count("signal:*"), 0);
        assert!(bus.subs.get("signal:*").is_none());
        assert!(bus.globs.get("signal:*").is_none());

        bus.publish("signal:X_1m", signal_msg(), None, false).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn allocated_ids_are_monotonic() {
        let bus = Arc::new(EventBus::new());
        assert_eq!(bus.publish("t", empty_bars(), None, false).await.unwrap(), 1);
        assert_eq!(bus.publish("t", empty_bars(), None, false).await.unwrap(), 2);

        let mut handles = Vec::new();
        for _ in 0..32 {
            let bus = Arc::clone(&bus);
            handles.push(tokio::spawn(async move {
                bus.publish("t", empty_bars(), None, false).await.unwrap()
            }));
        }
        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap());
        }
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 32);
        assert!(ids.iter().all(|&id| (3..=34).contains(&id)));
    }

    #[tokio::test]
    async fn subscribers_run_concurrently() {
        // Each subscriber waits for the other; sequential dispatch would hang.
        let bus = EventBus::new();
        let barrier = Arc::new(Barrier::new(2));
        for _ in 0..2 {
            let b = Arc::clone(&barrier);
            bus.subscribe(
                "t",
                SubscriberRef::from_fn(move |_msg, _id| {
                    let b = Arc::clone(&b);
                    async move {
                        b.wait().await;
                        Ok(())
                    }
                }),
            );
        }

        let done = tokio::time::timeout(
            Duration::from_secs(5),
            bus.publish("t", empty_bars(), None, false),
        )
        .await;
        assert!(done.is_ok());
    }

    #[tokio::test]
    async fn publishing_to_a_pattern_is_rejected() {
        let bus = EventBus::new();
        let err = bus.publish("signal:*", signal_msg(), None, false).await;
        assert!(matches!(err, Err(BwError::Publish(_))));
    }
}
