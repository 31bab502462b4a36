//! Per-member trend estimators feeding the decision engine's predictive
//! trigger (§4.6): SNR drop rate, latency spikes, loss spikes.
//!
//! Grounded on `wanctl_core::scoring::kalman::KalmanFilter` — the same
//! two-state filter the scoring pipeline could use for capacity trend
//! detection, reused here to watch the raw collector signal rather than
//! the normalized score.

use std::collections::VecDeque;
use wanctl_core::config::Config;
use wanctl_core::model::Metrics;
use wanctl_core::scoring::kalman::{KalmanConfig, KalmanFilter};

pub struct TrendSignals {
    pub snr_velocity: f64,
    pub latency_spike: bool,
    pub loss_spike: bool,
}

/// Owned by the scheduler, one per member, updated on every successful
/// collection before the sample is scored.
pub struct TrendTracker {
    latency_kalman: KalmanFilter,
    snr_kalman: KalmanFilter,
    recent_loss: VecDeque<f64>,
}

impl TrendTracker {
    pub fn new() -> Self {
        TrendTracker {
            latency_kalman: KalmanFilter::new(&KalmanConfig::for_latency()),
            snr_kalman: KalmanFilter::new(&KalmanConfig::for_signal()),
            recent_loss: VecDeque::new(),
        }
    }

    pub fn observe(&mut self, config: &Config, metrics: &Metrics) -> TrendSignals {
        let baseline_latency = self.latency_kalman.value();
        let was_initialized = self.latency_kalman.is_initialized();
        self.latency_kalman.update(metrics.common.latency_ms);
        let latency_spike = was_initialized
            && metrics.common.latency_ms - baseline_latency >= config.latency_spike_threshold;

        self.recent_loss.push_back(metrics.common.loss_pct);
        while self.recent_loss.len() > config.trend_window {
            self.recent_loss.pop_front();
        }
        let loss_spike = if self.recent_loss.len() >= 2 {
            let last = *self.recent_loss.back().unwrap();
            let prior: Vec<f64> = self
                .recent_loss
                .iter()
                .take(self.recent_loss.len() - 1)
                .copied()
                .collect();
            let baseline = prior.iter().sum::<f64>() / prior.len() as f64;
            last - baseline >= config.loss_spike_threshold
        } else {
            false
        };

        let snr_velocity = if let Some(starlink) = &metrics.class.starlink {
            self.snr_kalman.update(starlink.snr_db);
            self.snr_kalman.velocity()
        } else {
            0.0
        };

        TrendSignals {
            snr_velocity,
            latency_spike,
            loss_spike,
        }
    }
}

impl Default for TrendTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wanctl_core::model::{ClassMetrics, CommonMetrics, StarlinkMetrics};

    fn metrics_with_latency(ms: f64) -> Metrics {
        Metrics {
            common: CommonMetrics {
                latency_ms: ms,
                loss_pct: 0.0,
                jitter_ms: 0.0,
            },
            class: ClassMetrics::default(),
            link: Default::default(),
        }
    }

    #[test]
    fn latency_spike_requires_prior_baseline() {
        let config = Config::default();
        let mut tracker = TrendTracker::new();
        // first observation only seeds the filter, can't be a spike
        let signals = tracker.observe(&config, &metrics_with_latency(20.0));
        assert!(!signals.latency_spike);
    }

    #[test]
    fn sudden_latency_jump_is_flagged() {
        let config = Config::default();
        let mut tracker = TrendTracker::new();
        for _ in 0..5 {
            tracker.observe(&config, &metrics_with_latency(20.0));
        }
        let signals = tracker.observe(&config, &metrics_with_latency(20.0 + config.latency_spike_threshold + 50.0));
        assert!(signals.latency_spike);
    }

    #[test]
    fn snr_velocity_tracks_starlink_only() {
        let config = Config::default();
        let mut tracker = TrendTracker::new();
        let mut metrics = metrics_with_latency(20.0);
        metrics.class.starlink = Some(StarlinkMetrics {
            snr_db: 8.0,
            ..Default::default()
        });
        let signals = tracker.observe(&config, &metrics);
        assert_eq!(signals.snr_velocity, 0.0); // first sample, velocity starts at zero
    }
}
