//! # bw-core
//!
//! Core crate for the barwatch pipeline, providing:
//!
//! - **Types** (`types`): candles, series, signals, intervals, topic names
//! - **Event bus** (`bus`): topic/pattern pub/sub with duplicate suppression
//! - **Deduplication** (`dedup`): bounded `(topic, id)` recency window
//! - **Configuration** (`config`): JSON config deserialization
//! - **Error types** (`error`): domain-specific `BwError` via thiserror
//! - **Time utilities** (`time_util`): wall-clock timestamps
//! - **Logging** (`logging`): tracing-based structured logging

pub mod bus;
pub mod config;
pub mod dedup;
pub mod error;
pub mod logging;
pub mod time_util;
pub mod types;

pub use bus::{BusMessage, EventBus, Subscriber, SubscriberRef};
pub use error::{BwError, BwResult};
// Re-export types at crate root for convenience.
pub use types::*;
