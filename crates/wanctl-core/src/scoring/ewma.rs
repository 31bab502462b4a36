//! Exponentially weighted moving average with a warm-up period.
//!
//! Smooths the instant score into a stable trend line. The smoothing
//! factor `alpha` controls responsiveness: near 1.0 tracks the input
//! closely, near 0.0 retains history. Per §4.5 the engine runs a higher
//! alpha for the first few samples after a member is discovered so it
//! doesn't take minutes to leave its initial zeroed state, then settles
//! to a steadier alpha.

/// Exponentially weighted moving average filter.
pub struct Ewma {
    value: f64,
    initialized: bool,
}

impl Ewma {
    pub fn new() -> Self {
        Ewma {
            value: 0.0,
            initialized: false,
        }
    }

    /// Feed a new measurement, using `alpha` for this update. NaN/infinite
    /// measurements are ignored so a single bad reading can't poison the
    /// smoothed value.
    pub fn update(&mut self, measurement: f64, alpha: f64) {
        if measurement.is_nan() || measurement.is_infinite() {
            return;
        }
        if !self.initialized {
            self.value = measurement;
            self.initialized = true;
        } else {
            self.value = self.value * (1.0 - alpha) + measurement * alpha;
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

impl Default for Ewma {
    fn default() -> Self {
        Self::new()
    }
}

/// Chooses the EWMA alpha for the `n`th sample of a member (1-indexed),
/// per the warm-up rule in §4.5.
pub fn warmup_alpha(sample_index: u32, initial_samples: u32, alpha_initial: f64, alpha_steady: f64) -> f64 {
    if sample_index <= initial_samples {
        alpha_initial
    } else {
        alpha_steady
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_update_sets_value() {
        let mut ewma = Ewma::new();
        ewma.update(10.0, 0.5);
        assert!((ewma.value() - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn smooths_subsequent_updates() {
        let mut ewma = Ewma::new();
        ewma.update(10.0, 0.5);
        ewma.update(20.0, 0.5);
        assert!((ewma.value() - 15.0).abs() < f64::EPSILON);
    }

    #[test]
    fn ignores_nan() {
        let mut ewma = Ewma::new();
        ewma.update(10.0, 0.5);
        ewma.update(f64::NAN, 0.5);
        assert!((ewma.value() - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn warmup_switches_after_threshold() {
        assert_eq!(warmup_alpha(1, 10, 0.3, 0.1), 0.3);
        assert_eq!(warmup_alpha(10, 10, 0.3, 0.1), 0.3);
        assert_eq!(warmup_alpha(11, 10, 0.3, 0.1), 0.1);
    }
}
