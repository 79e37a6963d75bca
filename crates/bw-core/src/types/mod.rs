//! Core data types flowing through the pipeline.

pub mod candle;
pub mod interval;
pub mod signal;
pub mod topic;

pub use candle::*;
pub use interval::*;
pub use signal::*;
pub use topic::*;
