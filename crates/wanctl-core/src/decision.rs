//! Decision engine (§4.6): the state machine that turns scored candidates
//! into a `desired_primary`, with hysteresis and cooldown.
//!
//! Grounded on the same shape as the teacher's
//! `BondingScheduler::check_failover_conditions` — a pure function of
//! recently observed conditions that returns a trigger, called once per
//! tick, with the actual state transition applied by the caller holding
//! the mutable scheduler state.

use crate::config::Config;
use crate::model::{DecisionEvent, EventKind, RebootState, Score, ScoreBreakdown};
use crate::registry::Member;
use chrono::{DateTime, Utc};

/// Everything the decision engine needs about one candidate member for a
/// single tick, assembled by the scheduler from the telemetry store and
/// its own per-member trend estimators.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub member: Member,
    pub score: Score,
    pub breakdown: ScoreBreakdown,
    pub uptime_s: u64,
    pub reboot_state: RebootState,
    pub reboot_time_epoch: Option<i64>,
    /// Kalman-filtered SNR velocity; negative means dropping.
    pub snr_velocity: f64,
    pub latency_spike: bool,
    pub loss_spike: bool,
}

/// What the engine decided to do this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Maintain,
    ReactiveFailover,
    PredictiveFailover(&'static str),
    Failback,
}

impl Trigger {
    fn reason(&self) -> &'static str {
        match self {
            Trigger::Maintain => "maintain",
            Trigger::ReactiveFailover => "reactive_degradation",
            Trigger::PredictiveFailover(reason) => reason,
            Trigger::Failback => "failback_stable",
        }
    }
}

/// Outcome of one tick: the audit event to emit and, if an action was
/// taken, the new desired primary.
pub struct TickOutcome {
    pub event: DecisionEvent,
    pub new_desired_primary: Option<String>,
}

/// Per-tick state the engine owns across calls (§4.6).
pub struct DecisionEngine {
    current_primary: Option<String>,
    desired_primary: Option<String>,
    original_primary: Option<String>,
    last_action_at: Option<DateTime<Utc>>,
    /// How many consecutive ticks the reactive-failover condition has held,
    /// used against `FAIL_MIN_DURATION_S`.
    reactive_since: Option<DateTime<Utc>>,
    /// Consecutive ticks the failback condition has held, against
    /// `STABILITY_CHECKS`.
    failback_streak: u32,
    next_event_id: u64,
}

impl DecisionEngine {
    pub fn new() -> Self {
        DecisionEngine {
            current_primary: None,
            desired_primary: None,
            original_primary: None,
            last_action_at: None,
            reactive_since: None,
            failback_streak: 0,
            next_event_id: 1,
        }
    }

    pub fn current_primary(&self) -> Option<&str> {
        self.current_primary.as_deref()
    }

    pub fn desired_primary(&self) -> Option<&str> {
        self.desired_primary.as_deref()
    }

    /// Seed the engine with a known-current primary, used at startup from
    /// a restored snapshot or the controller's `get_current_primary`.
    pub fn set_initial_primary(&mut self, member: impl Into<String>) {
        let member = member.into();
        self.current_primary = Some(member.clone());
        self.desired_primary = Some(member.clone());
        self.original_primary = Some(member);
    }

    fn allocate_event_id(&mut self) -> u64 {
        let id = self.next_event_id;
        self.next_event_id += 1;
        id
    }

    fn predictive_trigger(config: &Config, candidate: &Candidate, now: DateTime<Utc>) -> Option<&'static str> {
        match candidate.reboot_state {
            RebootState::RebootRequired | RebootState::UpdateApplied => {
                return Some("reboot_imminent")
            }
            RebootState::Scheduled => {
                if let Some(epoch) = candidate.reboot_time_epoch {
                    if epoch - now.timestamp() <= config.warn_window_s {
                        return Some("reboot_imminent");
                    }
                }
            }
            RebootState::Idle => {}
        }
        if candidate.snr_velocity <= -config.snr_drop_threshold {
            return Some("snr_trend_degrading");
        }
        if candidate.latency_spike {
            return Some("latency_spike");
        }
        if candidate.loss_spike {
            return Some("loss_spike");
        }
        None
    }

    /// Run one decision tick against the already-sorted candidate list
    /// (`candidates[0]` is `best`, per §4.6 step 1's ordering).
    pub fn tick(&mut self, config: &Config, candidates: &[Candidate], now: DateTime<Utc>) -> TickOutcome {
        let event_id = self.allocate_event_id();

        let Some(best) = candidates.first() else {
            return TickOutcome {
                event: DecisionEvent {
                    timestamp: now,
                    event_id,
                    kind: EventKind::Error,
                    from: self.current_primary.clone(),
                    to: None,
                    reason: "no_eligible_members".to_string(),
                    confidence: 0.0,
                    thresholds: Vec::new(),
                    breakdowns: Vec::new(),
                },
                new_desired_primary: None,
            };
        };

        let cur = self
            .current_primary
            .as_ref()
            .and_then(|name| candidates.iter().find(|c| &c.member.name == name))
            .unwrap_or(best);

        let trigger = self.compute_trigger(config, best, cur, now);

        // Reactive and predictive triggers both mean "move off `cur`" — the
        // fact that `cur` happens to also be `best` (e.g. a rebooting
        // Starlink still out-scoring its alternatives) must not make the
        // failover a no-op. Pick the top-scored candidate that isn't `cur`;
        // a failback trigger already picks `best` != `cur` by construction.
        let target = match trigger {
            Trigger::ReactiveFailover | Trigger::PredictiveFailover(_) => candidates
                .iter()
                .find(|c| c.member.name != cur.member.name)
                .unwrap_or(best),
            _ => best,
        };

        let cooldown_ok = self
            .last_action_at
            .map(|t| (now - t).num_seconds() as u64 >= config.cooldown_s)
            .unwrap_or(true);
        let uptime_ok = target.uptime_s >= config.min_uptime_s;

        let thresholds = vec![
            ("switch_margin".to_string(), config.switch_margin),
            ("cooldown_s".to_string(), config.cooldown_s as f64),
            ("min_uptime_s".to_string(), config.min_uptime_s as f64),
            ("warn_window_s".to_string(), config.warn_window_s as f64),
        ];

        let take_action = trigger != Trigger::Maintain && cooldown_ok && uptime_ok;

        if take_action {
            self.last_action_at = Some(now);
            self.current_primary = Some(target.member.name.clone());
            self.desired_primary = Some(target.member.name.clone());
            if self.original_primary.is_none() {
                self.original_primary = Some(target.member.name.clone());
            }
            self.reactive_since = None;
            self.failback_streak = 0;

            TickOutcome {
                event: DecisionEvent {
                    timestamp: now,
                    event_id,
                    kind: EventKind::Action,
                    from: cur.member.name.clone().into(),
                    to: Some(target.member.name.clone()),
                    reason: trigger.reason().to_string(),
                    confidence: (target.score.final_score - cur.score.final_score).max(0.0) / 100.0,
                    thresholds,
                    breakdowns: vec![
                        ("best".to_string(), target.breakdown.clone()),
                        ("current".to_string(), cur.breakdown.clone()),
                    ],
                },
                new_desired_primary: Some(target.member.name.clone()),
            }
        } else {
            TickOutcome {
                event: DecisionEvent {
                    timestamp: now,
                    event_id,
                    kind: EventKind::Evaluation,
                    from: self.current_primary.clone(),
                    to: None,
                    reason: trigger.reason().to_string(),
                    confidence: 0.0,
                    thresholds,
                    breakdowns: vec![("best".to_string(), best.breakdown.clone())],
                },
                new_desired_primary: None,
            }
        }
    }

    fn compute_trigger(
        &mut self,
        config: &Config,
        best: &Candidate,
        cur: &Candidate,
        now: DateTime<Utc>,
    ) -> Trigger {
        let reactive_condition = cur.score.final_score == 0.0
            || (best.score.final_score - cur.score.final_score) >= config.switch_margin;

        if reactive_condition {
            let since = *self.reactive_since.get_or_insert(now);
            if (now - since).num_seconds() as u64 >= config.fail_min_duration_s {
                return Trigger::ReactiveFailover;
            }
        } else {
            self.reactive_since = None;
        }

        if cur.member.class == crate::model::MemberClass::Starlink {
            if let Some(reason) = Self::predictive_trigger(config, cur, now) {
                return Trigger::PredictiveFailover(reason);
            }
        }

        let is_failback_candidate = self
            .original_primary
            .as_deref()
            .map(|orig| orig == best.member.name)
            .unwrap_or(false)
            && self.current_primary.as_deref() != Some(best.member.name.as_str());

        if is_failback_candidate
            && best.score.final_score >= cur.score.final_score + config.failback_margin
        {
            self.failback_streak += 1;
            if self.failback_streak >= config.stability_checks {
                return Trigger::Failback;
            }
        } else {
            self.failback_streak = 0;
        }

        Trigger::Maintain
    }
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MemberClass;
    use chrono::Duration as ChronoDuration;

    fn candidate(name: &str, class: MemberClass, score: f64) -> Candidate {
        Candidate {
            member: Member::new(name, class, name),
            score: Score {
                instant: score,
                ewma: score,
                final_score: score,
                updated_at: Utc::now(),
                breakdown: ScoreBreakdown::default(),
            },
            breakdown: ScoreBreakdown::default(),
            uptime_s: 10_000,
            reboot_state: RebootState::Idle,
            reboot_time_epoch: None,
            snr_velocity: 0.0,
            latency_spike: false,
            loss_spike: false,
        }
    }

    #[test]
    fn normal_operation_no_action() {
        let config = Config::default();
        let mut engine = DecisionEngine::new();
        engine.set_initial_primary("wan");
        let candidates = vec![
            candidate("wan", MemberClass::Starlink, 85.0),
            candidate("lte", MemberClass::Cellular, 70.0),
        ];
        let outcome = engine.tick(&config, &candidates, Utc::now());
        assert_eq!(outcome.event.kind, EventKind::Evaluation);
        assert_eq!(engine.current_primary(), Some("wan"));
    }

    #[test]
    fn starlink_reboot_in_5_minutes_triggers_predictive_failover() {
        let config = Config::default();
        let mut engine = DecisionEngine::new();
        engine.set_initial_primary("wan");
        let now = Utc::now();
        let mut wan = candidate("wan", MemberClass::Starlink, 85.0);
        wan.reboot_state = RebootState::Scheduled;
        wan.reboot_time_epoch = Some(now.timestamp() + 300);
        // wan still outscores lte even while flagged for reboot, so it stays
        // candidates[0] per the sorted-by-score contract; the engine must
        // still fail over to lte rather than no-op onto wan.
        let candidates = vec![wan, candidate("lte", MemberClass::Cellular, 70.0)];
        let outcome = engine.tick(&config, &candidates, now);
        assert_eq!(outcome.event.kind, EventKind::Action);
        assert_eq!(outcome.event.reason, "reboot_imminent");
        assert_eq!(engine.desired_primary(), Some("lte"));
    }

    #[test]
    fn starlink_reboot_in_15_minutes_no_action() {
        let config = Config::default();
        let mut engine = DecisionEngine::new();
        engine.set_initial_primary("wan");
        let now = Utc::now();
        let mut wan = candidate("wan", MemberClass::Starlink, 85.0);
        wan.reboot_state = RebootState::Scheduled;
        wan.reboot_time_epoch = Some(now.timestamp() + 900);
        let candidates = vec![wan, candidate("lte", MemberClass::Cellular, 70.0)];
        let outcome = engine.tick(&config, &candidates, now);
        assert_eq!(outcome.event.kind, EventKind::Evaluation);
    }

    #[test]
    fn reactive_failover_requires_sustained_margin() {
        let config = Config::default();
        let mut engine = DecisionEngine::new();
        engine.set_initial_primary("wan");
        let now = Utc::now();
        let candidates = vec![
            candidate("lte", MemberClass::Cellular, 90.0),
            candidate("wan", MemberClass::Starlink, 10.0),
        ];
        // first tick starts the reactive timer but must not fire immediately
        let outcome = engine.tick(&config, &candidates, now);
        assert_eq!(outcome.event.kind, EventKind::Evaluation);

        let later = now + ChronoDuration::seconds(config.fail_min_duration_s as i64 + 1);
        let outcome = engine.tick(&config, &candidates, later);
        assert_eq!(outcome.event.kind, EventKind::Action);
        assert_eq!(outcome.event.reason, "reactive_degradation");
    }

    #[test]
    fn cooldown_blocks_second_action() {
        let config = Config::default();
        let mut engine = DecisionEngine::new();
        engine.set_initial_primary("wan");
        let now = Utc::now();
        let degraded = vec![
            candidate("lte", MemberClass::Cellular, 90.0),
            candidate("wan", MemberClass::Starlink, 0.0),
        ];
        engine.tick(&config, &degraded, now);
        let acted = engine.tick(
            &config,
            &degraded,
            now + ChronoDuration::seconds(config.fail_min_duration_s as i64 + 1),
        );
        assert_eq!(acted.event.kind, EventKind::Action);

        // immediately flip scores back and try to fail back right away
        let reverted = vec![
            candidate("wan", MemberClass::Starlink, 95.0),
            candidate("lte", MemberClass::Cellular, 10.0),
        ];
        let still_cooling = engine.tick(
            &config,
            &reverted,
            now + ChronoDuration::seconds(config.fail_min_duration_s as i64 + 2),
        );
        assert_eq!(still_cooling.event.kind, EventKind::Evaluation);
    }
}
