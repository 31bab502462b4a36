//! Adaptive sampler (§4.3): chooses each member's next collection
//! `(interval, probe_size, probe_count)` from connection type, recent
//! performance state, time of day, and recent failure count, and explains
//! the choice with a short reason string.
//!
//! Grounded on the teacher's `BitrateAdapter` (`strata-bonding::adaptation`):
//! same shape of a small per-entity state machine driving a control tuple
//! off a handful of signals, rate-limited so a flapping input doesn't
//! thrash the output.

use crate::config::Config;
use crate::model::MemberClass;
use chrono::{DateTime, Timelike, Utc};
use std::time::Duration;

/// Coarse performance bucket driving sampler aggressiveness. Distinct from
/// [`crate::model::Score`], which is the scoring engine's own fine-grained
/// output — the sampler only needs to know which bucket a member fell into
/// on its last tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceState {
    Stable,
    Degraded,
    Unstable,
    Failing,
}

impl PerformanceState {
    /// Classify from the windowed final score and a recent-failure count
    /// (consecutive collector errors for this member).
    pub fn classify(final_score: f64, recent_failures: u32) -> Self {
        if recent_failures >= 3 {
            PerformanceState::Failing
        } else if final_score < 30.0 {
            PerformanceState::Unstable
        } else if final_score < 60.0 {
            PerformanceState::Degraded
        } else {
            PerformanceState::Stable
        }
    }
}

/// The sampler's decision for one member's next collection cycle.
#[derive(Debug, Clone)]
pub struct SamplePlan {
    pub interval: Duration,
    pub probe_count: u32,
    pub reason: String,
}

/// Per-member sampler state. One instance lives per registry entry; the
/// scheduler (§5) owns the map and feeds it each tick's outcome.
#[derive(Debug, Clone)]
pub struct Sampler {
    class: MemberClass,
    recent_failures: u32,
    last_state: PerformanceState,
}

impl Sampler {
    pub fn new(class: MemberClass) -> Self {
        Sampler {
            class,
            recent_failures: 0,
            last_state: PerformanceState::Stable,
        }
    }

    pub fn record_success(&mut self) {
        self.recent_failures = 0;
    }

    pub fn record_failure(&mut self) {
        self.recent_failures = self.recent_failures.saturating_add(1);
    }

    /// Off-hours window (01:00-05:00 local... here UTC, since the collector
    /// has no timezone database available) during which stable unlimited
    /// links may be sampled less often.
    fn is_off_hours(now: DateTime<Utc>) -> bool {
        let hour = now.hour();
        (1..5).contains(&hour)
    }

    /// Compute the next `(interval, probe_count)` tuple and update internal
    /// state from the latest windowed score.
    pub fn plan(&mut self, config: &Config, final_score: f64, now: DateTime<Utc>) -> SamplePlan {
        let state = PerformanceState::classify(final_score, self.recent_failures);
        self.last_state = state;

        let metered = self.class.is_metered();
        let base = if metered {
            config.base_interval_metered
        } else {
            config.base_interval_unlimited
        };

        let (interval, reason) = match state {
            PerformanceState::Failing => {
                // Even metered links drop their floor when failing: we need
                // fresh data to decide whether to fail over.
                (base / 4, "failing: sampling above the metered floor")
            }
            PerformanceState::Unstable => (base / 2, "unstable: doubling sample rate"),
            PerformanceState::Degraded => (base, "degraded: base interval"),
            PerformanceState::Stable => {
                if !metered && Self::is_off_hours(now) {
                    (base * 4, "stable unlimited link off-hours: relaxing cadence")
                } else {
                    (base, "stable: base interval")
                }
            }
        };

        let interval = interval.max(Duration::from_millis(200));
        let probe_count = config.probe_counts.for_class(self.class);

        SamplePlan {
            interval,
            probe_count,
            reason: reason.to_string(),
        }
    }

    pub fn state(&self) -> PerformanceState {
        self.last_state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at_hour(hour: u32) -> DateTime<Utc> {
        Utc::now()
            .with_hour(hour)
            .unwrap()
            .with_minute(0)
            .unwrap()
            .with_second(0)
            .unwrap()
    }

    #[test]
    fn metered_link_never_beats_its_floor_unless_failing() {
        let config = Config::default();
        let mut sampler = Sampler::new(MemberClass::Cellular);
        let plan = sampler.plan(&config, 80.0, at_hour(12));
        assert_eq!(plan.interval, config.base_interval_metered);
    }

    #[test]
    fn metered_link_speeds_up_when_failing() {
        let config = Config::default();
        let mut sampler = Sampler::new(MemberClass::Cellular);
        sampler.record_failure();
        sampler.record_failure();
        sampler.record_failure();
        let plan = sampler.plan(&config, 10.0, at_hour(12));
        assert!(plan.interval < config.base_interval_metered);
    }

    #[test]
    fn stable_unlimited_link_relaxes_off_hours() {
        let config = Config::default();
        let mut sampler = Sampler::new(MemberClass::Wifi);
        let daytime = sampler.plan(&config, 90.0, at_hour(12));
        let nighttime = sampler.plan(&config, 90.0, at_hour(3));
        assert!(nighttime.interval > daytime.interval);
    }

    #[test]
    fn unstable_state_doubles_sample_rate() {
        let config = Config::default();
        let mut sampler = Sampler::new(MemberClass::Wifi);
        let plan = sampler.plan(&config, 15.0, at_hour(12));
        assert_eq!(plan.interval, config.base_interval_unlimited / 2);
        assert_eq!(sampler.state(), PerformanceState::Unstable);
    }

    #[test]
    fn probe_count_follows_class() {
        let config = Config::default();
        let mut sampler = Sampler::new(MemberClass::Starlink);
        let plan = sampler.plan(&config, 90.0, at_hour(12));
        assert_eq!(plan.probe_count, config.probe_counts.satellite);
    }
}
