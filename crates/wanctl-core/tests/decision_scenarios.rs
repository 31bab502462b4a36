//! End-to-end scenarios wiring scoring, decision, and controller together,
//! rather than exercising each module against hand-built inputs in
//! isolation. Candidate construction here mirrors what the scheduler's
//! decision loop does: score a sample, then fold the result into a
//! `Candidate` alongside the trend/obstruction fields the collector would
//! have attached.

use chrono::{Duration as ChronoDuration, Utc};
use wanctl_core::config::Config;
use wanctl_core::controller::{Controller, ControllerBackend};
use wanctl_core::decision::{Candidate, DecisionEngine};
use wanctl_core::error::ControllerError;
use wanctl_core::model::{
    CommonMetrics, EventKind, MemberClass, Metrics, RebootState, StarlinkMetrics,
};
use wanctl_core::registry::Member;
use wanctl_core::scoring::ScoringEngine;

fn healthy_common() -> CommonMetrics {
    CommonMetrics {
        latency_ms: 25.0,
        loss_pct: 0.1,
        jitter_ms: 4.0,
    }
}

fn starlink_metrics(common: CommonMetrics, starlink: StarlinkMetrics) -> Metrics {
    Metrics {
        common,
        class: wanctl_core::model::ClassMetrics {
            starlink: Some(starlink),
            cellular: None,
            wifi: None,
        },
        link: Default::default(),
    }
}

fn idle_starlink() -> StarlinkMetrics {
    StarlinkMetrics {
        obstruction_pct: 0.4,
        time_obstructed_pct: 0.0,
        avg_prolonged_obstruction_s: 0.0,
        patches_valid: 7200,
        valid_s: 53349.0,
        snr_db: 9.0,
        pop_ping_drop_rate: 0.0,
        uplink_throughput: 8_000.0,
        downlink_throughput: 60_000.0,
        reboot_state: RebootState::Idle,
        reboot_time_epoch: None,
    }
}

fn score_to_candidate(
    engine: &mut ScoringEngine,
    config: &Config,
    member: &Member,
    metrics: &Metrics,
    window: &[f64],
) -> Candidate {
    let score = engine.score(config, member, metrics, window);
    let starlink = metrics.class.starlink.as_ref();
    Candidate {
        member: member.clone(),
        score: score.clone(),
        breakdown: score.breakdown,
        uptime_s: 100_000,
        reboot_state: starlink.map(|s| s.reboot_state).unwrap_or_default(),
        reboot_time_epoch: starlink.and_then(|s| s.reboot_time_epoch),
        snr_velocity: 0.0,
        latency_spike: false,
        loss_spike: false,
    }
}

fn sort_best_first(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.score
            .final_score
            .partial_cmp(&a.score.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.member.weight.cmp(&a.member.weight))
    });
}

#[test]
fn normal_operation_holds_primary_across_many_ticks() {
    let config = Config::default();
    let wan = Member::new("wan", MemberClass::Starlink, "eth1").with_weight(80);
    let lte = Member::new("lte", MemberClass::Cellular, "wwan0").with_weight(50);

    let mut scoring = ScoringEngine::new();
    let mut decision = DecisionEngine::new();
    decision.set_initial_primary("wan");

    let now = Utc::now();
    for i in 0..20 {
        let wan_metrics = starlink_metrics(healthy_common(), idle_starlink());
        let lte_metrics = Metrics::common_only(
            CommonMetrics {
                latency_ms: 60.0,
                loss_pct: 1.0,
                jitter_ms: 15.0,
            },
            Default::default(),
        );

        let mut candidates = vec![
            score_to_candidate(&mut scoring, &config, &wan, &wan_metrics, &[]),
            score_to_candidate(&mut scoring, &config, &lte, &lte_metrics, &[]),
        ];
        sort_best_first(&mut candidates);

        let tick_time = now + ChronoDuration::seconds(i);
        let outcome = decision.tick(&config, &candidates, tick_time);
        assert_eq!(outcome.event.kind, EventKind::Evaluation);
    }
    assert_eq!(decision.current_primary(), Some("wan"));
}

#[test]
fn harmless_obstruction_burst_never_trips_the_kill_switch() {
    let config = Config::default();
    let wan = Member::new("wan", MemberClass::Starlink, "eth1").with_weight(80);

    let mut scoring = ScoringEngine::new();
    // A real burst: a moment of obstruction_pct above zero but with
    // negligible historical share and no prolonged outage, seen against a
    // long, clean history — the exact shape `is_obstruction_poor` is meant
    // to shrug off.
    let burst = StarlinkMetrics {
        obstruction_pct: 0.42,
        time_obstructed_pct: 0.000_037,
        avg_prolonged_obstruction_s: f64::NAN,
        patches_valid: 7201,
        valid_s: 53_349.0,
        ..idle_starlink()
    };
    let metrics = starlink_metrics(healthy_common(), burst);
    let candidate = score_to_candidate(&mut scoring, &config, &wan, &metrics, &[]);
    assert!(candidate.score.final_score > 0.0, "burst must not zero the score via the kill switch");
}

#[test]
fn sustained_tree_growth_obstruction_drives_reactive_failover() {
    let config = Config::default();
    let wan = Member::new("wan", MemberClass::Starlink, "eth1").with_weight(80);
    let lte = Member::new("lte", MemberClass::Cellular, "wwan0").with_weight(50);

    let mut scoring = ScoringEngine::new();
    let mut decision = DecisionEngine::new();
    decision.set_initial_primary("wan");

    let now = Utc::now();
    // Obstruction grown enough to clear the historical-share threshold —
    // the slow, compounding case rather than a single bad reading.
    let grown = StarlinkMetrics {
        obstruction_pct: 4.5,
        time_obstructed_pct: 2.3,
        avg_prolonged_obstruction_s: 45.0,
        patches_valid: 5000,
        valid_s: 53_349.0,
        ..idle_starlink()
    };
    let wan_metrics = starlink_metrics(healthy_common(), grown);
    let lte_metrics = Metrics::common_only(
        CommonMetrics {
            latency_ms: 45.0,
            loss_pct: 0.3,
            jitter_ms: 7.0,
        },
        Default::default(),
    );

    let mut outcome_kind = None;
    for i in 0..(config.fail_min_duration_s as i64 + 2) {
        let mut candidates = vec![
            score_to_candidate(&mut scoring, &config, &wan, &wan_metrics, &[]),
            score_to_candidate(&mut scoring, &config, &lte, &lte_metrics, &[]),
        ];
        sort_best_first(&mut candidates);
        let outcome = decision.tick(&config, &candidates, now + ChronoDuration::seconds(i));
        outcome_kind = Some(outcome.event.kind);
        if outcome.event.kind == EventKind::Action {
            assert_eq!(outcome.event.reason, "reactive_degradation");
            break;
        }
    }
    assert_eq!(outcome_kind, Some(EventKind::Action));
    assert_eq!(decision.current_primary(), Some("lte"));
}

#[test]
fn predictive_failover_moves_off_a_rebooting_primary_even_when_it_still_scores_best() {
    let config = Config::default();
    let wan = Member::new("wan", MemberClass::Starlink, "eth1").with_weight(80);
    let lte = Member::new("lte", MemberClass::Cellular, "wwan0").with_weight(50);

    let mut scoring = ScoringEngine::new();
    let mut decision = DecisionEngine::new();
    decision.set_initial_primary("wan");

    let now = Utc::now();
    let wan_metrics = starlink_metrics(healthy_common(), idle_starlink());
    let lte_metrics = Metrics::common_only(
        CommonMetrics {
            latency_ms: 60.0,
            loss_pct: 1.0,
            jitter_ms: 15.0,
        },
        Default::default(),
    );

    let mut wan_candidate = score_to_candidate(&mut scoring, &config, &wan, &wan_metrics, &[]);
    // A reboot 5 minutes out doesn't move the score at all, so wan still
    // outranks lte on the merits and must stay candidates[0].
    wan_candidate.reboot_state = RebootState::Scheduled;
    wan_candidate.reboot_time_epoch = Some(now.timestamp() + 300);
    let lte_candidate = score_to_candidate(&mut scoring, &config, &lte, &lte_metrics, &[]);

    let mut candidates = vec![wan_candidate, lte_candidate];
    sort_best_first(&mut candidates);
    assert_eq!(candidates[0].member.name, "wan", "wan must still be best by score");

    let outcome = decision.tick(&config, &candidates, now);
    assert_eq!(outcome.event.kind, EventKind::Action);
    assert_eq!(outcome.event.reason, "reboot_imminent");
    assert_eq!(decision.current_primary(), Some("lte"));
}

/// Models the §4.7.B verified-apply contract (write, then re-read the
/// default route up to 5 times) without shelling out, so the test stays
/// deterministic and independent of any `uci`/`ip` binary being present.
struct NeverConvergingBackend {
    attempts: std::sync::atomic::AtomicU32,
}

impl ControllerBackend for NeverConvergingBackend {
    fn name(&self) -> &'static str {
        "route_metric"
    }
    fn is_available(&self) -> bool {
        true
    }
    fn apply(&self, _members: &[Member], primary: &str) -> Result<(), ControllerError> {
        for _ in 0..5 {
            self.attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
        Err(ControllerError::VerificationFailed {
            member: primary.to_string(),
            attempts: 5,
        })
    }
    fn get_current_primary(&self, _members: &[Member]) -> Result<Option<String>, ControllerError> {
        Ok(None)
    }
}

#[test]
fn apply_exhausts_all_five_verification_retries_and_marks_the_plan_failed() {
    let backend = NeverConvergingBackend {
        attempts: std::sync::atomic::AtomicU32::new(0),
    };
    let controller = Controller::new(Box::new(backend), std::time::Duration::from_secs(30));
    let members = vec![
        Member::new("wan", MemberClass::Starlink, "eth1"),
        Member::new("lte", MemberClass::Cellular, "eth0"),
    ];

    let err = controller.set_primary(&members, "wan", false).unwrap_err();
    match err {
        ControllerError::VerificationFailed { member, attempts } => {
            assert_eq!(member, "wan");
            assert_eq!(attempts, 5);
        }
        other => panic!("expected VerificationFailed, got {other:?}"),
    }

    let plan = controller.current_plan().unwrap();
    assert_eq!(plan.status, wanctl_core::model::PlanStatus::Failed);
}
