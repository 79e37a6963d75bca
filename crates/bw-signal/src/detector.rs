//! Detector capability.

use bw_core::{BwResult, Candle, CandleSeries, Direction, Signal, ohlcv_topic, signal_topic};

/// A pure, stateless check run against every new bar series of one pair.
///
/// Thresholds are fixed at construction. `check` returns at most one signal,
/// always for the last bar of the series.
pub trait Detector: Send + Sync {
    fn name(&self) -> &str;
    fn instrument(&self) -> &str;
    fn interval(&self) -> &str;

    fn check(&self, bars: &CandleSeries) -> BwResult<Option<Signal>>;

    /// Topic this detector consumes.
    fn ohlcv_topic(&self) -> String {
        ohlcv_topic(self.instrument(), self.interval())
    }

    /// Topic this detector's signals are published on.
    fn signal_topic(&self) -> String {
        signal_topic(self.instrument(), self.interval())
    }

    /// Build a signal stamped with `bar`'s close time and price.
    fn signal_at(&self, bar: &Candle, direction: Direction, strength: f64) -> Signal {
        Signal {
            name: self.name().to_string(),
            instrument: self.instrument().to_string(),
            interval: self.interval().to_string(),
            direction,
            strength,
            at: bar.close_time,
            price: bar.close,
        }
    }
}

/// Crossing between two consecutive bars: short EMA moving strictly from
/// below the long EMA to strictly above (`Up`), or the reverse (`Down`).
/// Undefined EMAs never cross.
#[inline]
pub(crate) fn crossing(
    prev: (Option<f64>, Option<f64>),
    curr: (Option<f64>, Option<f64>),
) -> Option<Direction> {
    let ((Some(ps), Some(pl)), (Some(cs), Some(cl))) = (prev, curr) else {
        return None;
    };
    if ps < pl && cs > cl {
        Some(Direction::Up)
    } else if ps > pl && cs < cl {
        Some(Direction::Down)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crossing_is_strict() {
        assert_eq!(crossing((Some(1.0), Some(2.0)), (Some(3.0), Some(2.0))), Some(Direction::Up));
        assert_eq!(crossing((Some(3.0), Some(2.0)), (Some(1.0), Some(2.0))), Some(Direction::Down));
        // touching is not crossing
        assert_eq!(crossing((Some(2.0), Some(2.0)), (Some(3.0), Some(2.0))), None);
        assert_eq!(crossing((None, Some(2.0)), (Some(3.0), Some(2.0))), None);
    }
}
