//! Payloads carried on the bus.

use std::sync::Arc;

use crate::types::{CandleSeries, Signal};

/// A tagged union of everything published on the bus.
///
/// Bar series are shared behind `Arc` so fan-out to many subscribers never
/// copies the bars.
#[derive(Debug, Clone)]
pub enum BusMessage {
    /// A freshly fetched series, published on `ohlcv:*` topics.
    Bars(Arc<CandleSeries>),
    /// A detector result, published on `signal:*` topics.
    Signal(Signal),
}

impl BusMessage {
    pub fn bars(series: CandleSeries) -> Self {
        Self::Bars(Arc::new(series))
    }

    pub fn as_bars(&self) -> Option<&Arc<CandleSeries>> {
        match self {
            Self::Bars(s) => Some(s),
            Self::Signal(_) => None,
        }
    }

    pub fn as_signal(&self) -> Option<&Signal> {
        match self {
            Self::Signal(s) => Some(s),
            Self::Bars(_) => None,
        }
    }
}
