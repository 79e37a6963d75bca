//! EMA crossover between the last two bars.

use bw_core::config::{DetectorTarget, EmaCrossParams};
use bw_core::{BwResult, CandleSeries, Signal};

use crate::detector::{Detector, crossing};
use crate::indicators::{EPSILON, ema};

/// Fires when the short EMA of closes crosses the long EMA on the last bar.
///
/// Strength is the normalized gap `(short - long) / max(|long|, ε)` at that
/// bar, so it is negative for `Down`.
#[derive(Debug, Clone)]
pub struct EmaCrossDetector {
    target: DetectorTarget,
    params: EmaCrossParams,
}

impl EmaCrossDetector {
    pub fn new(target: DetectorTarget, params: EmaCrossParams) -> BwResult<Self> {
        let target = target.canonical()?;
        params.validate()?;
        Ok(Self { target, params })
    }

    /// Bars needed before a crossing can be evaluated.
    pub fn min_bars(&self) -> usize {
        self.params.short_window.max(self.params.long_window) + 2
    }
}

impl Detector for EmaCrossDetector {
    fn name(&self) -> &str {
        &self.target.name
    }

    fn instrument(&self) -> &str {
        &self.target.instrument
    }

    fn interval(&self) -> &str {
        &self.target.interval
    }

    fn check(&self, bars: &CandleSeries) -> BwResult<Option<Signal>> {
        let n = bars.len();
        if n < self.min_bars() {
            return Ok(None);
        }

        let closes = bars.closes();
        let short = ema(&closes, self.params.short_window)?;
        let long = ema(&closes, self.params.long_window)?;

        let prev = (short[n - 2], long[n - 2]);
        let curr = (short[n - 1], long[n - 1]);
        let Some(direction) = crossing(prev, curr) else {
            return Ok(None);
        };
        let (Some(s), Some(l)) = curr else {
            return Ok(None);
        };

        let strength = (s - l) / l.abs().max(EPSILON);
        let bar = &bars[n - 1];
        Ok(Some(self.signal_at(bar, direction, strength)))
    }
}
