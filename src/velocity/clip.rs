use tracing::{info, warn};

use crate::config::CLIP_QUANTILE;
use crate::types::{EntityVelocity, TraceId};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClipError {
    /// A non-finite rate makes the percentile undefined.
    NonFinite,
}

impl std::fmt::Display for ClipError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClipError::NonFinite => write!(f, "non-finite views_per_min in batch"),
        }
    }
}

/// Caps every result at the batch's 99th percentile of `views_per_min`.
///
/// Upper bound only. An empty batch is returned as-is. If the percentile cannot be
/// computed the batch is returned unclipped and a warning is logged; this never
/// fails the run.
pub fn clip_outliers(results: Vec<EntityVelocity>, trace_id: &TraceId) -> Vec<EntityVelocity> {
    if results.is_empty() {
        return results;
    }

    let values: Vec<f64> = results.iter().map(|r| r.views_per_min).collect();
    let ceiling = match quantile(&values, CLIP_QUANTILE) {
        Ok(Some(c)) => c,
        Ok(None) => return results,
        Err(e) => {
            warn!(trace_id = %trace_id, error = %e, "Outlier clipping skipped, using unclipped values");
            return results;
        }
    };

    let values_clipped = values.iter().filter(|v| **v > ceiling).count();
    info!(
        trace_id = %trace_id,
        original_count = results.len(),
        values_clipped,
        percentile_99_threshold = ceiling,
        "Outlier clipping applied"
    );
    apply_ceiling(results, ceiling)
}

/// Caps `views_per_min` at `ceiling`. Applying the same ceiling again is a no-op.
pub fn apply_ceiling(mut results: Vec<EntityVelocity>, ceiling: f64) -> Vec<EntityVelocity> {
    for r in &mut results {
        if r.views_per_min > ceiling {
            r.views_per_min = ceiling;
        }
    }
    results
}

/// Quantile with linear interpolation between closest ranks: position `(n-1)·q`
/// in the sorted values. `Ok(None)` for an empty slice.
pub fn quantile(values: &[f64], q: f64) -> Result<Option<f64>, ClipError> {
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ClipError::NonFinite);
    }
    if values.is_empty() {
        return Ok(None);
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let pos = (sorted.len() - 1) as f64 * q.clamp(0.0, 1.0);
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    Ok(Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac))
}
