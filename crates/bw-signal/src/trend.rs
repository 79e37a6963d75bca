//! Trend detector: EMA crossing confirmed by a volatility breakout and a
//! minimum EMA separation.
//!
//! # Scan
//!
//! Over the trailing `confirmation_window + 1` bars, oldest first:
//!
//! 1. a short/long EMA crossing sets the direction and clears the volatility
//!    flag;
//! 2. `fast_tr / atr > ratio_threshold` sets the volatility flag, which stays
//!    set until the next crossing;
//! 3. with a direction and the flag set, the normalized gap
//!    `|short - long| / max(|long|, ε)` is tested against the hysteresis
//!    threshold. The first bar passing it ends the scan: a signal if it is
//!    the last bar, nothing otherwise (the move was already confirmed
//!    earlier).

use bw_core::config::{DetectorTarget, TrendParams};
use bw_core::{BwResult, CandleSeries, Direction, Signal};

use crate::detector::{Detector, crossing};
use crate::indicators::{EPSILON, atr, ema, fast_true_range, volatility_ratio};

/// Per-bar inputs of the confirmation scan.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct TrendRow {
    pub ema_short: Option<f64>,
    pub ema_long: Option<f64>,
    pub ratio: Option<f64>,
}

impl TrendRow {
    fn emas(&self) -> (Option<f64>, Option<f64>) {
        (self.ema_short, self.ema_long)
    }
}

/// Result of a successful scan: direction and strength (`ratio - threshold`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Confirmed {
    pub direction: Direction,
    pub strength: f64,
}

/// Run the confirmation scan. `rows` must hold at least
/// `confirmation_window + 2` entries.
pub(crate) fn scan(rows: &[TrendRow], params: &TrendParams) -> Option<Confirmed> {
    let n = rows.len();
    let cw = params.confirmation_window;
    if n < cw + 2 {
        return None;
    }

    let mut direction: Option<Direction> = None;
    let mut volatile = false;

    for i in (n - cw - 1)..n {
        let prev = &rows[i - 1];
        let curr = &rows[i];

        if let Some(d) = crossing(prev.emas(), curr.emas()) {
            direction = Some(d);
            volatile = false;
        }
        if curr.ratio.is_some_and(|r| r > params.ratio_threshold) {
            volatile = true;
        }

        let Some(dir) = direction else { continue };
        if !volatile {
            continue;
        }
        let (Some(s), Some(l)) = curr.emas() else { continue };

        let gap = (s - l) / l.abs().max(EPSILON);
        if gap.abs() >= params.hysteresis_threshold {
            if i + 1 == n {
                let strength = curr.ratio.map_or(0.0, |r| r - params.ratio_threshold);
                return Some(Confirmed {
                    direction: dir,
                    strength,
                });
            }
            return None;
        }
    }
    None
}

/// EMA-cross + volatility + hysteresis detector.
#[derive(Debug, Clone)]
pub struct TrendDetector {
    target: DetectorTarget,
    params: TrendParams,
}

impl TrendDetector {
    pub fn new(target: DetectorTarget, params: TrendParams) -> BwResult<Self> {
        let target = target.canonical()?;
        params.validate()?;
        Ok(Self { target, params })
    }

    pub fn params(&self) -> &TrendParams {
        &self.params
    }

    /// Bars needed before the scan can run.
    pub fn min_bars(&self) -> usize {
        self.params.max_window() + self.params.confirmation_window + 2
    }

    fn rows(&self, bars: &CandleSeries) -> BwResult<Vec<TrendRow>> {
        let closes = bars.closes();
        let short = ema(&closes, self.params.short_window)?;
        let long = ema(&closes, self.params.long_window)?;
        let slow = atr(bars, self.params.atr_window)?;
        let fast = fast_true_range(bars, self.params.fast_tr_window)?;

        Ok((0..bars.len())
            .map(|i| TrendRow {
                ema_short: short[i],
                ema_long: long[i],
                ratio: volatility_ratio(fast[i], slow[i]),
            })
            .collect())
    }
}

impl Detector for TrendDetector {
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
        if bars.len() < self.min_bars() {
            return Ok(None);
        }
        let rows = self.rows(bars)?;
        let Some(hit) = scan(&rows, &self.params) else {
            return Ok(None);
        };
        let last = &bars[bars.len() - 1];
        Ok(Some(self.signal_at(last, hit.direction, hit.strength)))
    }
}
