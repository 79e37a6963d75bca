//! Bar indicators over a full series.
//!
//! Every function returns one value per input bar. Positions before the
//! indicator has seen `window` samples are `None`.

use bw_core::{BwError, BwResult, Candle};
use ta::Next;
use ta::indicators::ExponentialMovingAverage;

/// Guard for divisions by a price level that may be zero.
pub const EPSILON: f64 = 1e-12;

/// Exponential moving average, `k = 2 / (window + 1)`, seeded with the first
/// value.
pub fn ema(values: &[f64], window: usize) -> BwResult<Vec<Option<f64>>> {
    let mut ema = ExponentialMovingAverage::new(window)
        .map_err(|e| BwError::Indicator(format!("ema({window}): {e:?}")))?;
    Ok(values
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let out = ema.next(v);
            (i + 1 >= window).then_some(out)
        })
        .collect())
}

/// True range per bar: `max(high - low, |high - prev_close|, |low - prev_close|)`.
/// The first bar has no previous close and uses `high - low`.
pub fn true_range(bars: &[Candle]) -> Vec<f64> {
    let mut prev_close: Option<f64> = None;
    bars.iter()
        .map(|c| {
            let hl = c.high - c.low;
            let tr = match prev_close {
                Some(pc) => hl.max((c.high - pc).abs()).max((c.low - pc).abs()),
                None => hl,
            };
            prev_close = Some(c.close);
            tr
        })
        .collect()
}

/// Streaming Wilder ATR: SMA of the first `window` true ranges, then
/// `atr = (atr * (window - 1) + tr) / window`.
#[derive(Debug, Clone)]
pub struct WilderAtr {
    window: usize,
    seed_sum: f64,
    count: usize,
    current: Option<f64>,
}

impl WilderAtr {
    pub fn new(window: usize) -> BwResult<Self> {
        if window == 0 {
            return Err(BwError::Indicator("atr window must be at least 1".into()));
        }
        Ok(Self {
            window,
            seed_sum: 0.0,
            count: 0,
            current: None,
        })
    }

    /// Feed one true range; returns the ATR once `window` values were seen.
    pub fn next(&mut self, tr: f64) -> Option<f64> {
        self.count += 1;
        self.current = match self.current {
            Some(prev) => {
                let n = self.window as f64;
                Some((prev * (n - 1.0) + tr) / n)
            }
            None => {
                self.seed_sum += tr;
                (self.count >= self.window).then(|| self.seed_sum / self.window as f64)
            }
        };
        self.current
    }

    pub fn value(&self) -> Option<f64> {
        self.current
    }
}

/// Wilder ATR per bar.
pub fn atr(bars: &[Candle], window: usize) -> BwResult<Vec<Option<f64>>> {
    let mut atr = WilderAtr::new(window)?;
    Ok(true_range(bars).into_iter().map(|tr| atr.next(tr)).collect())
}

/// Fast volatility: EMA of the true range with span `span`.
pub fn fast_true_range(bars: &[Candle], span: usize) -> BwResult<Vec<Option<f64>>> {
    ema(&true_range(bars), span)
}

/// `fast / (slow + EPSILON)`, or `None` if either side is undefined.
#[inline]
pub fn volatility_ratio(fast: Option<f64>, slow: Option<f64>) -> Option<f64> {
    let r = fast? / (slow? + EPSILON);
    r.is_finite().then_some(r)
}
