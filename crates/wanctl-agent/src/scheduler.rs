//! Scheduler / main loop (§4.1–§4.8 wiring, §5 concurrency model, C8).
//!
//! Grounded on `strata_bonding::runtime::BondingRuntime`: one named OS
//! thread per collector, paced independently, plus one decision-tick
//! thread. Unlike the teacher's runtime the shared state here (the
//! telemetry store, the controller) already serializes its own writers
//! internally, so collector threads talk to it directly instead of
//! through a command channel — the work queue the teacher needs to keep
//! a single scheduler thread authoritative over link state isn't needed
//! when that state is already mutex-guarded per §5's "telemetry store is
//! the only mutable shared structure" policy.

use crate::trend::TrendTracker;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use wanctl_core::collectors::cellular::CellularCollector;
use wanctl_core::collectors::icmp::IcmpCollector;
use wanctl_core::collectors::link::LinkCounterCollector;
use wanctl_core::collectors::starlink::StarlinkCollector;
use wanctl_core::collectors::wifi::WifiCollector;
use wanctl_core::collectors::{CollectContext, Collector};
use wanctl_core::config::Config;
use wanctl_core::decision::{Candidate, DecisionEngine};
use wanctl_core::error::CollectorError;
use wanctl_core::model::{EventKind, MemberClass, Metrics, Sample};
use wanctl_core::registry::{Member, Registry};
use wanctl_core::sampler::Sampler;
use wanctl_core::audit::AuditLogger;
use wanctl_core::controller::Controller;
use wanctl_core::scoring::ScoringEngine;
use wanctl_core::telemetry::TelemetryStore;

/// All per-class collectors the scheduler dispatches against, shared
/// read-only across every collector thread.
pub struct CollectorSet {
    pub icmp: IcmpCollector,
    pub link: LinkCounterCollector,
    pub wifi: WifiCollector,
    pub cellular: CellularCollector,
    pub starlink: StarlinkCollector,
}

impl CollectorSet {
    /// Merge the common (ICMP) reading, the class-specific reading, and
    /// link counters into one `Metrics` (§3: "only fields relevant to
    /// member.class are populated").
    fn collect(&self, member: &Member, ctx: &CollectContext) -> Result<Metrics, CollectorError> {
        let common = self.icmp.collect(member, ctx)?;
        let mut merged = common;

        let class_result = match member.class {
            MemberClass::Starlink => self.starlink.collect(member, ctx),
            MemberClass::Cellular => self.cellular.collect(member, ctx),
            MemberClass::Wifi => self.wifi.collect(member, ctx),
            MemberClass::Lan | MemberClass::Vpn => Ok(Metrics::default()),
        };
        if let Ok(class_metrics) = class_result {
            merged.class = class_metrics.class;
        }

        if let Ok(link_metrics) = self.link.collect(member, ctx) {
            merged.link = link_metrics.link;
        }

        Ok(merged)
    }
}

/// Everything the two scheduler loops need shared access to. Built once
/// in `main` and cloned (cheaply, via `Arc`) into every spawned thread.
pub struct Shared {
    pub config: Config,
    pub registry: Mutex<Registry>,
    pub store: TelemetryStore,
    pub collectors: CollectorSet,
    pub controller: Controller,
    pub audit: AuditLogger,
    pub decision: Mutex<DecisionEngine>,
    pub scoring: Mutex<ScoringEngine>,
    pub shutdown: AtomicBool,
    pub started_at: chrono::DateTime<Utc>,
}

/// Join handles for the running scheduler, used to implement the bounded
/// drain window at shutdown (§5: "must exit within a bounded drain
/// window, default 5 s").
pub struct CoreHandle {
    handles: Vec<thread::JoinHandle<()>>,
}

impl CoreHandle {
    /// Spawn one collector thread per currently-eligible member plus the
    /// single decision-tick thread.
    pub fn spawn(shared: Arc<Shared>) -> Self {
        let mut handles = Vec::new();
        let members: Vec<Member> = shared
            .registry
            .lock()
            .expect("registry mutex poisoned")
            .eligible()
            .cloned()
            .collect();

        for member in members {
            let shared = shared.clone();
            let name = format!("wanctl-collect-{}", member.name);
            let handle = thread::Builder::new()
                .name(name)
                .spawn(move || run_collector_loop(shared, member))
                .expect("failed to spawn collector thread");
            handles.push(handle);
        }

        let decision_shared = shared.clone();
        let decision_handle = thread::Builder::new()
            .name("wanctl-decision".to_string())
            .spawn(move || run_decision_loop(decision_shared))
            .expect("failed to spawn decision thread");
        handles.push(decision_handle);

        CoreHandle { handles }
    }

    /// Signal every thread to stop and wait for them, bounded by `timeout`.
    /// Threads that haven't exited when the bound elapses are abandoned
    /// (the process is exiting anyway).
    pub fn shutdown(self, shared: &Shared, timeout: Duration) {
        shared.shutdown.store(true, Ordering::SeqCst);
        let deadline = std::time::Instant::now() + timeout;
        for handle in self.handles {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            // JoinHandle has no timed join; a short poll loop approximates
            // it well enough for a handful of threads.
            while !handle.is_finished() && std::time::Instant::now() < deadline {
                thread::sleep(Duration::from_millis(20));
            }
            let _ = handle.join();
        }
    }
}

fn class_timeout(config: &Config, class: MemberClass) -> Duration {
    match class {
        MemberClass::Cellular => config.cellular_timeout,
        _ => Duration::from_secs(3),
    }
}

fn run_collector_loop(shared: Arc<Shared>, member: Member) {
    let mut sampler = Sampler::new(member.class);
    let mut last_final_score = 100.0;

    while !shared.shutdown.load(Ordering::Relaxed) {
        let now = Utc::now();
        let plan = sampler.plan(&shared.config, last_final_score, now);
        let ctx = CollectContext::new(
            class_timeout(&shared.config, member.class),
            shared.config.dry_run,
            plan.probe_count,
        );

        match shared.collectors.collect(&member, &ctx) {
            Ok(metrics) => {
                sampler.record_success();
                let window = shared
                    .store
                    .snapshot(&member.name, shared.config.window_samples)
                    .iter()
                    .map(|s| s.final_score)
                    .collect::<Vec<_>>();
                let score = shared
                    .scoring
                    .lock()
                    .expect("scoring mutex poisoned")
                    .score(&shared.config, &member, &metrics, &window);
                last_final_score = score.final_score;

                let sample = Sample {
                    timestamp: now,
                    member: member.name.clone(),
                    metrics,
                    instant_score: score.instant,
                    ewma_score: score.ewma,
                    final_score: score.final_score,
                    breakdown: score.breakdown,
                };
                let _ = shared.store.insert(sample);
            }
            Err(_) => {
                sampler.record_failure();
            }
        }

        sleep_respecting_shutdown(&shared.shutdown, plan.interval);
    }
}

fn sleep_respecting_shutdown(shutdown: &AtomicBool, total: Duration) {
    let step = Duration::from_millis(200);
    let mut slept = Duration::ZERO;
    while slept < total {
        if shutdown.load(Ordering::Relaxed) {
            return;
        }
        let chunk = step.min(total - slept);
        thread::sleep(chunk);
        slept += chunk;
    }
}

fn run_decision_loop(shared: Arc<Shared>) {
    let mut trackers: HashMap<String, TrendTracker> = HashMap::new();

    while !shared.shutdown.load(Ordering::Relaxed) {
        let now = Utc::now();
        let members: Vec<Member> = {
            let registry = shared.registry.lock().expect("registry mutex poisoned");
            registry.eligible().cloned().collect()
        };

        let mut candidates: Vec<Candidate> = members
            .iter()
            .filter_map(|member| {
                let sample = shared.store.latest(&member.name)?;
                let tracker = trackers.entry(member.name.clone()).or_insert_with(TrendTracker::new);
                let signals = tracker.observe(&shared.config, &sample.metrics);
                let starlink = sample.metrics.class.starlink.as_ref();
                Some(Candidate {
                    member: member.clone(),
                    score: wanctl_core::model::Score {
                        instant: sample.instant_score,
                        ewma: sample.ewma_score,
                        final_score: sample.final_score,
                        updated_at: sample.timestamp,
                        breakdown: sample.breakdown.clone(),
                    },
                    breakdown: sample.breakdown.clone(),
                    uptime_s: (now - member.created_at).num_seconds().max(0) as u64,
                    reboot_state: starlink.map(|s| s.reboot_state).unwrap_or_default(),
                    reboot_time_epoch: starlink.and_then(|s| s.reboot_time_epoch),
                    snr_velocity: signals.snr_velocity,
                    latency_spike: signals.latency_spike,
                    loss_spike: signals.loss_spike,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .final_score
                .partial_cmp(&a.score.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.member.weight.cmp(&a.member.weight))
                .then(b.member.class.default_priority().cmp(&a.member.class.default_priority()))
        });

        if !candidates.is_empty() {
            let outcome = {
                let mut engine = shared.decision.lock().expect("decision mutex poisoned");
                if engine.current_primary().is_none() {
                    engine.set_initial_primary(candidates[0].member.name.clone());
                }
                engine.tick(&shared.config, &candidates, now)
            };

            shared.store.push_event(outcome.event.clone());
            let _ = shared.audit.write(&outcome.event);

            if let Some(new_primary) = outcome.new_desired_primary {
                match shared.controller.set_primary(&members, &new_primary, false) {
                    Ok(()) => {}
                    Err(Ok(remaining)) => {
                        tracing::debug!(member = %new_primary, remaining_s = remaining.0.as_secs(), "apply skipped: cooldown");
                    }
                    Err(Err(err)) => {
                        tracing::error!(member = %new_primary, error = %err, "apply failed");
                        let error_event = wanctl_core::model::DecisionEvent {
                            timestamp: Utc::now(),
                            event_id: 0,
                            kind: EventKind::Error,
                            from: shared.decision.lock().expect("decision mutex poisoned").current_primary().map(str::to_string),
                            to: Some(new_primary),
                            reason: err.to_string(),
                            confidence: 0.0,
                            thresholds: Vec::new(),
                            breakdowns: Vec::new(),
                        };
                        shared.store.push_event(error_event.clone());
                        let _ = shared.audit.write(&error_event);
                    }
                }
            }
        }

        sleep_respecting_shutdown(&shared.shutdown, shared.config.base_interval_unlimited);
    }
}
