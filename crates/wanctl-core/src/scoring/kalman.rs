//! Two-state Kalman filter for smoothing noisy per-sample measurements.
//! State vector: `[value, velocity]`.
//!
//! The velocity component is what the predictive trigger (§4.6) reads for
//! SNR drop-rate and latency-spike detection — a degrading link shows up
//! as a negative/positive velocity well before a single sample crosses a
//! kill threshold.

/// A two-state Kalman filter: [value, velocity].
#[derive(Debug, Clone)]
pub struct KalmanFilter {
    x: f64,
    v: f64,

    p00: f64,
    p01: f64,
    p11: f64,

    q_value: f64,
    q_velocity: f64,
    r: f64,

    initialized: bool,
}

/// Configuration for a Kalman filter instance.
#[derive(Debug, Clone)]
pub struct KalmanConfig {
    /// Process noise for the value state. Higher = more reactive to changes.
    pub q_value: f64,
    /// Process noise for the velocity state.
    pub q_velocity: f64,
    /// Measurement noise variance. Higher = smoother output, more lag.
    pub r: f64,
}

impl KalmanConfig {
    /// Suitable for latency smoothing (values in milliseconds).
    pub fn for_latency() -> Self {
        KalmanConfig {
            q_value: 0.5,
            q_velocity: 0.1,
            r: 10.0,
        }
    }

    /// Suitable for throughput estimation (values in kbps).
    pub fn for_throughput() -> Self {
        KalmanConfig {
            q_value: 50.0,
            q_velocity: 5.0,
            r: 500.0,
        }
    }

    /// Suitable for SNR/signal strength tracking (values in dB).
    pub fn for_signal() -> Self {
        KalmanConfig {
            q_value: 1.0,
            q_velocity: 0.2,
            r: 5.0,
        }
    }
}

impl KalmanFilter {
    pub fn new(config: &KalmanConfig) -> Self {
        KalmanFilter {
            x: 0.0,
            v: 0.0,
            p00: 1000.0,
            p01: 0.0,
            p11: 1000.0,
            q_value: config.q_value,
            q_velocity: config.q_velocity,
            r: config.r,
            initialized: false,
        }
    }

    pub fn value(&self) -> f64 {
        self.x
    }

    pub fn velocity(&self) -> f64 {
        self.v
    }

    pub fn is_increasing(&self) -> bool {
        self.v > 0.0
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn predict(&mut self) {
        self.x += self.v;

        let new_p00 = self.p00 + 2.0 * self.p01 + self.p11 + self.q_value;
        let new_p01 = self.p01 + self.p11 + self.q_velocity;
        let new_p11 = self.p11 + self.q_velocity;

        self.p00 = new_p00;
        self.p01 = new_p01;
        self.p11 = new_p11;
    }

    /// Incorporate a new measurement.
    pub fn update(&mut self, measurement: f64) {
        if !self.initialized {
            self.x = measurement;
            self.v = 0.0;
            self.initialized = true;
            return;
        }

        self.predict();

        let y = measurement - self.x;
        let s = self.p00 + self.r;

        let k0 = self.p00 / s;
        let k1 = self.p01 / s;

        self.x += k0 * y;
        self.v += k1 * y;

        let new_p00 = self.p00 - k0 * self.p00;
        let new_p01 = self.p01 - k0 * self.p01;
        let new_p11 = self.p11 - k1 * self.p01;

        self.p00 = new_p00;
        self.p01 = new_p01;
        self.p11 = new_p11;
    }

    pub fn predict_ahead(&self, steps: u32) -> f64 {
        self.x + self.v * steps as f64
    }

    pub fn reset(&mut self) {
        self.x = 0.0;
        self.v = 0.0;
        self.p00 = 1000.0;
        self.p01 = 0.0;
        self.p11 = 1000.0;
        self.initialized = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_measurement_sets_value() {
        let mut kf = KalmanFilter::new(&KalmanConfig::for_latency());
        assert!(!kf.is_initialized());
        kf.update(50.0);
        assert!(kf.is_initialized());
        assert!((kf.value() - 50.0).abs() < 0.01);
    }

    #[test]
    fn smooths_noisy_measurements() {
        let mut kf = KalmanFilter::new(&KalmanConfig::for_latency());
        let measurements = [55.0, 48.0, 52.0, 47.0, 53.0, 49.0, 51.0, 50.0, 48.0, 52.0];
        for &m in &measurements {
            kf.update(m);
        }
        assert!((kf.value() - 50.0).abs() < 5.0);
    }

    #[test]
    fn detects_increasing_trend() {
        let mut kf = KalmanFilter::new(&KalmanConfig::for_latency());
        for i in 0..20 {
            kf.update(50.0 + i as f64 * 2.0);
        }
        assert!(kf.is_increasing());
        assert!(kf.velocity() > 0.5);
    }

    #[test]
    fn signal_filter_tracks_snr() {
        let mut kf = KalmanFilter::new(&KalmanConfig::for_signal());
        let measurements = [8.0, 6.0, 7.5, 6.5, 7.0];
        for &m in &measurements {
            kf.update(m);
        }
        assert!((kf.value() - 7.0).abs() < 2.0);
    }

    #[test]
    fn reset_clears_state() {
        let mut kf = KalmanFilter::new(&KalmanConfig::for_latency());
        kf.update(50.0);
        kf.reset();
        assert!(!kf.is_initialized());
        assert!((kf.value() - 0.0).abs() < 0.01);
    }
}
