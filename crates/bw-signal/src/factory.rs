//! Detector construction from config entries.

use std::sync::Arc;

use ahash::AHashSet;
use bw_core::BwResult;
use bw_core::config::DetectorConfig;
use tracing::warn;

use crate::detector::Detector;
use crate::ema_cross::EmaCrossDetector;
use crate::trend::TrendDetector;

pub fn build_detector(cfg: &DetectorConfig) -> BwResult<Arc<dyn Detector>> {
    let det: Arc<dyn Detector> = match cfg {
        DetectorConfig::EmaCross { target, params } => {
            Arc::new(EmaCrossDetector::new(target.clone(), params.clone())?)
        }
        DetectorConfig::Trend { target, params } => {
            Arc::new(TrendDetector::new(target.clone(), params.clone())?)
        }
    };
    Ok(det)
}

/// Build every configured detector, failing on the first invalid entry.
pub fn build_detectors(cfgs: &[DetectorConfig]) -> BwResult<Vec<Arc<dyn Detector>>> {
    let mut names = AHashSet::new();
    let mut out = Vec::with_capacity(cfgs.len());
    for cfg in cfgs {
        let det = build_detector(cfg)?;
        if !names.insert(det.name().to_string()) {
            warn!("[factory] duplicate detector name '{}'", det.name());
        }
        out.push(det);
    }
    Ok(out)
}
