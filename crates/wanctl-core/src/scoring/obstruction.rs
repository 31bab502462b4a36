//! Starlink obstruction predictor (C9, §4.5 step 5).
//!
//! Replaces a raw `obstruction_pct ≥ threshold` check with a multi-factor
//! rule, the same shape the teacher's modem supervisor uses hysteresis
//! instead of a single instant reading to decide a link is actually
//! degraded rather than momentarily noisy.

use crate::config::ObstructionThresholds;
use crate::model::StarlinkMetrics;

/// Whether obstruction data is reliable enough to use the refined rule.
/// Thin samples fall back to the simple instant-threshold check (§4.5).
fn has_sufficient_data(metrics: &StarlinkMetrics, thresholds: &ObstructionThresholds) -> bool {
    metrics.patches_valid >= thresholds.min_patches && metrics.valid_s >= thresholds.min_valid_s
}

/// Evaluate whether a Starlink member's obstruction state should be
/// treated as poor enough to contribute to a kill or predictive trigger.
pub fn is_obstruction_poor(
    metrics: &StarlinkMetrics,
    thresholds: &ObstructionThresholds,
    kill_obstruction_pct: f64,
) -> bool {
    if !has_sufficient_data(metrics, thresholds) {
        return metrics.obstruction_pct >= kill_obstruction_pct;
    }

    let historical = metrics.time_obstructed_pct >= thresholds.hist_threshold_pct;
    let prolonged = metrics.avg_prolonged_obstruction_s.is_finite()
        && metrics.avg_prolonged_obstruction_s >= thresholds.prolonged_threshold_s;
    let emergency = metrics.obstruction_pct
        >= thresholds.normal_obstruction_pct * thresholds.emergency_multiplier;

    historical || prolonged || emergency
}
