//! Duplicate suppression for bus publishes.
//!
//! The bus may see the same `(topic, message id)` pair more than once, e.g. a
//! scheduler re-polling a bar that has already been published, or an adaptor
//! re-deriving a signal from a redelivered series. [`DedupWindow`] remembers
//! the most recent pairs so that only the *first* publish is delivered.
//!
//! The window is bounded: once `capacity` distinct pairs have been recorded,
//! the oldest is evicted. Beyond that horizon suppression is best-effort only.

use std::collections::VecDeque;
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};

/// Default number of `(topic, id)` pairs remembered by the bus.
pub const DEFAULT_DEDUPE_WINDOW: usize = 8192;

// ---------------------------------------------------------------------------
// DedupWindow: bounded FIFO + lookup set
// ---------------------------------------------------------------------------

/// Bounded recency set of `(topic, message id)` pairs.
///
/// `order` keeps FIFO insertion order for eviction, `seen` gives O(1)
/// membership checks keyed by topic. Both always hold the same pairs, and
/// topic names are shared between them, so lookups never allocate.
///
/// # Thread safety
///
/// Not thread-safe. The bus keeps it behind its ordering lock.
pub struct DedupWindow {
    capacity: usize,
    seen: AHashMap<Arc<str>, AHashSet<u64>>,
    order: VecDeque<(Arc<str>, u64)>,
}

impl DedupWindow {
    /// Create a window remembering at most `capacity` pairs (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            seen: AHashMap::new(),
            order: VecDeque::with_capacity(capacity),
        }
    }

    /// Whether `(topic, id)` is inside the window.
    #[inline]
    pub fn contains(&self, topic: &str, id: u64) -> bool {
        self.seen.get(topic).is_some_and(|ids| ids.contains(&id))
    }

    /// Record `(topic, id)`, evicting the oldest pair when over capacity.
    ///
    /// Re-inserting a pair already in the window is a no-op and does not
    /// refresh its position.
    pub fn insert(&mut self, topic: &str, id: u64) {
        let key = match self.seen.get_key_value(topic) {
            Some((k, _)) => Arc::clone(k),
            None => Arc::from(topic),
        };
        if !self.seen.entry(Arc::clone(&key)).or_default().insert(id) {
            return;
        }
        self.order.push_back((key, id));
        while self.order.len() > self.capacity {
            if let Some((old_topic, old_id)) = self.order.pop_front() {
                self.evict(&old_topic, old_id);
            }
        }
    }

    fn evict(&mut self, topic: &str, id: u64) {
        let now_empty = match self.seen.get_mut(topic) {
            Some(ids) => {
                ids.remove(&id);
                ids.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.seen.remove(topic);
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of distinct topics currently tracked.
    pub fn topic_count(&self) -> usize {
        self.seen.len()
    }

    /// Clear all state.
    pub fn clear(&mut self) {
        self.seen.clear();
        self.order.clear();
    }
}

impl Default for DedupWindow {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUPE_WINDOW)
    }
}
