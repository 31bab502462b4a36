//! Scoring pipeline (§4.5): kill-switch check, weighted components, EWMA,
//! windowed clamp.

pub mod ewma;
pub mod kalman;
pub mod obstruction;
pub mod window;
pub mod weights;

use crate::config::Config;
use crate::model::{MemberClass, Metrics, Score, ScoreBreakdown};
use crate::registry::Member;
use chrono::Utc;
use ewma::{warmup_alpha, Ewma};
use std::collections::HashMap;

struct MemberScoreState {
    ewma: Ewma,
    sample_count: u32,
}

impl MemberScoreState {
    fn new() -> Self {
        MemberScoreState {
            ewma: Ewma::new(),
            sample_count: 0,
        }
    }
}

/// Holds the per-member EWMA state the pipeline needs across ticks. Owned
/// by the scheduler alongside the telemetry store.
pub struct ScoringEngine {
    state: HashMap<String, MemberScoreState>,
}

impl ScoringEngine {
    pub fn new() -> Self {
        ScoringEngine {
            state: HashMap::new(),
        }
    }

    /// Whether any kill-switch metric is tripped for this sample (§4.5
    /// step 1, with the refined starlink-only rule from §4.5 step 5).
    fn is_killed(config: &Config, member: &Member, metrics: &Metrics) -> bool {
        if metrics.common.loss_pct >= config.kill_loss_pct {
            return true;
        }
        if metrics.common.latency_ms >= config.kill_latency_ms {
            return true;
        }
        if member.class == MemberClass::Starlink {
            if let Some(starlink) = &metrics.class.starlink {
                return obstruction::is_obstruction_poor(
                    starlink,
                    &config.obstruction,
                    config.kill_obstruction_pct,
                );
            }
        }
        false
    }

    /// Score one new sample for `member`, advancing that member's EWMA
    /// state and clamping against `window` (recent final scores, oldest
    /// first, NOT including this sample).
    pub fn score(
        &mut self,
        config: &Config,
        member: &Member,
        metrics: &Metrics,
        window: &[f64],
    ) -> Score {
        let entry = self
            .state
            .entry(member.name.clone())
            .or_insert_with(MemberScoreState::new);
        entry.sample_count += 1;

        let killed = Self::is_killed(config, member, metrics);
        let (instant, mut breakdown) = if killed {
            (0.0, ScoreBreakdown::default())
        } else {
            weights::weighted_instant_score(config, member, metrics)
        };
        if killed {
            breakdown.penalties.push(("kill_switch".to_string(), 100.0));
        }

        let alpha = warmup_alpha(
            entry.sample_count,
            config.ewma_initial_samples,
            config.ewma_alpha_initial,
            config.ewma_alpha_steady,
        );
        entry.ewma.update(instant, alpha);
        let ewma_value = entry.ewma.value();

        let final_score = if killed {
            0.0
        } else {
            window::clamp_to_window(ewma_value, window)
        };

        breakdown.weights.push(("ewma_alpha".to_string(), alpha));

        Score {
            instant,
            ewma: ewma_value,
            final_score,
            updated_at: Utc::now(),
            breakdown,
        }
    }

    /// Drop state for a member that's been removed. No-op if unknown.
    pub fn forget(&mut self, member: &str) {
        self.state.remove(member);
    }
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CommonMetrics;

    fn healthy_metrics() -> Metrics {
        Metrics::common_only(
            CommonMetrics {
                latency_ms: 20.0,
                loss_pct: 0.0,
                jitter_ms: 5.0,
            },
            Default::default(),
        )
    }

    #[test]
    fn kill_switch_zeroes_score_regardless_of_other_fields() {
        let config = Config::default();
        let member = Member::new("wan", MemberClass::Lan, "eth0");
        let mut metrics = healthy_metrics();
        metrics.common.loss_pct = config.kill_loss_pct;
        let mut engine = ScoringEngine::new();
        let score = engine.score(&config, &member, &metrics, &[]);
        assert_eq!(score.final_score, 0.0);
        assert_eq!(score.instant, 0.0);
    }

    #[test]
    fn healthy_member_scores_well() {
        let config = Config::default();
        let member = Member::new("wan", MemberClass::Lan, "eth0").with_weight(80);
        let metrics = healthy_metrics();
        let mut engine = ScoringEngine::new();
        let score = engine.score(&config, &member, &metrics, &[]);
        assert!(score.final_score > 70.0);
    }

    #[test]
    fn ewma_warms_up_then_settles() {
        let config = Config::default();
        let member = Member::new("wan", MemberClass::Lan, "eth0");
        let mut engine = ScoringEngine::new();
        let metrics = healthy_metrics();
        for _ in 0..config.ewma_initial_samples + 5 {
            engine.score(&config, &member, &metrics, &[]);
        }
        // should have converged near the instant score after warm-up
        let score = engine.score(&config, &member, &metrics, &[]);
        assert!((score.ewma - score.instant).abs() < 5.0);
    }
}
