//! Fan-out from bar topics to detectors.
//!
//! One bus subscription per `ohlcv:` topic, shared by every detector bound to
//! that pair. Each bar series runs the topic's detectors in registration
//! order; every signal is published on the detector's `signal:` topic with
//! the last bar's close time as message id.
//!
//! Handlers hold a `Weak` reference to the bus. The adaptor itself owns the
//! `Arc` and the handles needed to unsubscribe.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use ahash::{AHashMap, AHashSet};
use async_trait::async_trait;
use bw_core::{BusMessage, EventBus, Subscriber, SubscriberRef};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::detector::Detector;

type DetectorList = Arc<RwLock<Vec<Arc<dyn Detector>>>>;

struct Binding {
    handle: SubscriberRef,
    detectors: DetectorList,
}

/// Binds detectors to the bus and owns their subscriptions.
pub struct SignalAdaptor {
    bus: Arc<EventBus>,
    bindings: AHashMap<String, Binding>,
}

impl SignalAdaptor {
    /// Subscribe `detectors`, grouped by the bar topic each consumes.
    pub async fn bind(
        bus: Arc<EventBus>,
        detectors: impl IntoIterator<Item = Arc<dyn Detector>>,
    ) -> Self {
        let mut adaptor = Self {
            bus,
            bindings: AHashMap::new(),
        };
        adaptor.add(detectors).await;
        adaptor
    }

    /// Register more detectors. Known topics get the detectors appended
    /// without a new subscription; unknown topics are subscribed.
    pub async fn add(&mut self, detectors: impl IntoIterator<Item = Arc<dyn Detector>>) {
        for det in detectors {
            let topic = det.ohlcv_topic();
            if let Some(binding) = self.bindings.get(&topic) {
                binding.detectors.write().await.push(det);
                continue;
            }

            let list: DetectorList = Arc::new(RwLock::new(vec![det]));
            let handle = SubscriberRef::new(TopicHandler {
                topic: topic.clone(),
                bus: Arc::downgrade(&self.bus),
                detectors: Arc::clone(&list),
            });
            self.bus.subscribe(&topic, handle.clone());
            info!("[adaptor] bound {topic}");
            self.bindings.insert(
                topic,
                Binding {
                    handle,
                    detectors: list,
                },
            );
        }
    }

    /// Remove every subscription this adaptor created.
    pub fn unbind(&mut self) {
        for (topic, binding) in self.bindings.drain() {
            self.bus.unsubscribe(&topic, &binding.handle);
            debug!("[adaptor] unbound {topic}");
        }
    }

    /// Bound bar topics, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.bindings.keys().cloned().collect();
        topics.sort();
        topics
    }

    pub async fn detector_count(&self) -> usize {
        let mut n = 0;
        for binding in self.bindings.values() {
            n += binding.detectors.read().await.len();
        }
        n
    }
}

/// Bus subscriber for one bar topic.
struct TopicHandler {
    topic: String,
    bus: Weak<EventBus>,
    detectors: DetectorList,
}

#[async_trait]
impl Subscriber for TopicHandler {
    async fn on_message(&self, msg: BusMessage, msg_id: u64) -> anyhow::Result<()> {
        let Some(series) = msg.as_bars() else {
            debug!("[adaptor] {}: ignoring non-bar message", self.topic);
            return Ok(());
        };
        let Some(bus) = self.bus.upgrade() else {
            return Ok(());
        };

        let detectors = self.detectors.read().await.clone();
        let signal_id = series.last_close_time().unwrap_or(msg_id);
        let mut emitted: AHashSet<String> = AHashSet::new();

        for det in detectors {
            let sig = match catch_unwind(AssertUnwindSafe(|| det.check(series))) {
                Ok(Ok(Some(sig))) => sig,
                Ok(Ok(None)) => continue,
                Ok(Err(e)) => {
                    warn!("[adaptor] detector '{}' failed on {}: {e}", det.name(), self.topic);
                    continue;
                }
                Err(_) => {
                    error!("[adaptor] detector '{}' panicked on {}", det.name(), self.topic);
                    continue;
                }
            };

            let topic = det.signal_topic();
            if !emitted.insert(topic.clone()) {
                warn!(
                    "[adaptor] '{}' signal on {topic} id={signal_id} shadowed by an earlier detector",
                    det.name()
                );
            }
            info!(
                "[adaptor] {} {} {} strength={:.4}",
                sig.name, topic, sig.direction, sig.strength
            );
            if let Err(e) = bus
                .publish(&topic, BusMessage::Signal(sig), Some(signal_id), true)
                .await
            {
                warn!("[adaptor] publish to {topic} failed: {e}");
            }
        }
        Ok(())
    }
}
