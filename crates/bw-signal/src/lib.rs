//! # bw-signal
//!
//! Signal detection on top of the barwatch bus.
//!
//! ```text
//! ohlcv:{instrument}_{interval} ──► SignalAdaptor ──► Detector::check (each, in order)
//!                                        │
//!                                        └──► signal:{instrument}_{interval} ──► SignalLogSink
//! ```
//!
//! - [`indicators`]: EMA, true range, Wilder ATR
//! - [`detector`]: the [`Detector`] trait
//! - [`ema_cross`] / [`trend`]: detector implementations
//! - [`adaptor`]: bus fan-out to detectors
//! - [`sink`]: signal logging consumer
//! - [`factory`]: detectors from config

pub mod adaptor;
pub mod detector;
pub mod ema_cross;
pub mod factory;
pub mod indicators;
pub mod sink;
pub mod trend;

pub use adaptor::SignalAdaptor;
pub use detector::Detector;
pub use ema_cross::EmaCrossDetector;
pub use factory::{build_detector, build_detectors};
pub use sink::{SignalLogSink, format_signal};
pub use trend::TrendDetector;
