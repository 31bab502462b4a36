//! Windowed final-score clamp (§4.5 step 4).
//!
//! `final = clamp(ewma, Q10(window), Q90(window))`, damping single-sample
//! spikes while letting sustained changes propagate.

/// The k-th percentile of `values` using linear interpolation between
/// closest ranks. `values` need not be pre-sorted.
pub fn percentile(values: &[f64], k: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = (k / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let frac = rank - lower as f64;
    sorted[lower] * (1.0 - frac) + sorted[upper] * frac
}

/// Clamp `ewma` to the `[Q10, Q90]` band of `window`, then to `[0, 100]`.
/// An empty window leaves `ewma` unclamped except for the final `[0,100]`
/// bound.
pub fn clamp_to_window(ewma: f64, window: &[f64]) -> f64 {
    if window.is_empty() {
        return ewma.clamp(0.0, 100.0);
    }
    let q10 = percentile(window, 10.0);
    let q90 = percentile(window, 90.0);
    let (lo, hi) = if q10 <= q90 { (q10, q90) } else { (q90, q10) };
    ewma.clamp(lo, hi).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_of_uniform_samples() {
        let values: Vec<f64> = (0..=100).map(|v| v as f64).collect();
        assert!((percentile(&values, 10.0) - 10.0).abs() < 1e-9);
        assert!((percentile(&values, 90.0) - 90.0).abs() < 1e-9);
        assert!((percentile(&values, 50.0) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn single_value_window_returns_that_value() {
        assert_eq!(percentile(&[42.0], 10.0), 42.0);
    }

    #[test]
    fn clamp_damps_spike_inside_stable_window() {
        let window: Vec<f64> = vec![80.0; 9].into_iter().chain(std::iter::once(10.0)).collect();
        let clamped = clamp_to_window(10.0, &window);
        assert!(clamped > 10.0, "a single-sample spike should be damped");
    }

    #[test]
    fn clamp_lets_sustained_change_through() {
        let window = vec![30.0; 10];
        let clamped = clamp_to_window(30.0, &window);
        assert!((clamped - 30.0).abs() < 1e-9);
    }

    #[test]
    fn empty_window_only_applies_absolute_bounds() {
        assert_eq!(clamp_to_window(150.0, &[]), 100.0);
        assert_eq!(clamp_to_window(-10.0, &[]), 0.0);
    }
}
