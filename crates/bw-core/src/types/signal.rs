//! Detector output.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Direction of a detected crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "UP"),
            Self::Down => write!(f, "DOWN"),
        }
    }
}

/// A trade signal emitted by a detector for one bar.
///
/// At most one signal is emitted per `(detector, bar)`; `at` is the close
/// time of the bar that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub name: String,
    pub instrument: String,
    pub interval: String,
    pub direction: Direction,
    pub strength: f64,
    pub at: u64,
    pub price: f64,
}
