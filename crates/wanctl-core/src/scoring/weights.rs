//! Per-class component normalization (§4.5 steps 1-2).
//!
//! Each of the nine weighted components is normalized into `[0,100]`
//! against a benchmark pair before being combined with the configured
//! weight vector. Components without a direct metric for a given class
//! (e.g. `data_usage` on an unmetered link) default to a neutral 100 —
//! a link isn't penalized for a dimension that doesn't apply to it.

use crate::config::{Benchmark, Config};
use crate::model::{MemberClass, Metrics, RegistrationState, ScoreBreakdown};
use crate::registry::Member;

/// Normalize Starlink/cellular/wifi throughput into `[0,100]` against a
/// fixed 1-50 Mbps band; unlimited wired classes are assumed excellent.
fn bandwidth_component(class: MemberClass, metrics: &Metrics) -> f64 {
    let bench = Benchmark {
        excellent: 50_000.0,
        poor: 1_000.0,
    };
    match class {
        MemberClass::Starlink => metrics
            .class
            .starlink
            .as_ref()
            .map(|s| bench.normalize(s.downlink_throughput))
            .unwrap_or(100.0),
        MemberClass::Cellular => metrics
            .class
            .cellular
            .as_ref()
            .map(|_| 70.0) // no direct throughput sample; neutral-ish
            .unwrap_or(100.0),
        MemberClass::Wifi => metrics
            .class
            .wifi
            .as_ref()
            .map(|w| {
                Benchmark {
                    excellent: 300.0,
                    poor: 10.0,
                }
                .normalize(w.bitrate)
            })
            .unwrap_or(100.0),
        MemberClass::Lan | MemberClass::Vpn => 100.0,
    }
}

fn stability_component(metrics: &Metrics) -> f64 {
    Benchmark {
        excellent: 5.0,
        poor: 100.0,
    }
    .normalize(metrics.common.jitter_ms)
}

fn connection_state_component(class: MemberClass, metrics: &Metrics) -> f64 {
    match class {
        MemberClass::Cellular => metrics
            .class
            .cellular
            .as_ref()
            .map(|c| match c.registration_state {
                RegistrationState::Registered => 100.0,
                RegistrationState::Roaming => 60.0,
                RegistrationState::Searching => 20.0,
                RegistrationState::Denied | RegistrationState::Unknown => 0.0,
            })
            .unwrap_or(0.0),
        MemberClass::Starlink => metrics
            .class
            .starlink
            .as_ref()
            .map(|s| if s.pop_ping_drop_rate < 0.05 { 100.0 } else { 40.0 })
            .unwrap_or(100.0),
        MemberClass::Wifi | MemberClass::Lan | MemberClass::Vpn => 100.0,
    }
}

fn signal_component(class: MemberClass, metrics: &Metrics) -> f64 {
    match class {
        MemberClass::Cellular => metrics
            .class
            .cellular
            .as_ref()
            .map(|c| {
                Benchmark {
                    excellent: -80.0,
                    poor: -120.0,
                }
                .normalize(c.rsrp)
            })
            .unwrap_or(0.0),
        MemberClass::Wifi => metrics
            .class
            .wifi
            .as_ref()
            .map(|w| {
                Benchmark {
                    excellent: -50.0,
                    poor: -90.0,
                }
                .normalize(w.signal_dbm)
            })
            .unwrap_or(0.0),
        MemberClass::Starlink => metrics
            .class
            .starlink
            .as_ref()
            .map(|s| {
                Benchmark {
                    excellent: 10.0,
                    poor: 0.0,
                }
                .normalize(s.snr_db)
            })
            .unwrap_or(100.0),
        MemberClass::Lan | MemberClass::Vpn => 100.0,
    }
}

fn data_usage_component(class: MemberClass) -> f64 {
    if class.is_metered() {
        80.0
    } else {
        100.0
    }
}

fn uptime_component(metrics: &Metrics) -> f64 {
    let total_errors = metrics.link.rx_errors + metrics.link.tx_errors;
    let total_bytes = metrics.link.rx_bytes + metrics.link.tx_bytes;
    if total_bytes == 0 {
        return 100.0;
    }
    let error_ratio = total_errors as f64 / total_bytes.max(1) as f64;
    (100.0 - error_ratio * 1_000_000.0).clamp(0.0, 100.0)
}

/// Compute the weighted instant score for a non-kill-switched sample, along
/// with the breakdown used for audit records.
pub fn weighted_instant_score(
    config: &Config,
    member: &Member,
    metrics: &Metrics,
) -> (f64, ScoreBreakdown) {
    let w = &config.weights;
    let latency = config.latency_benchmark.normalize(metrics.common.latency_ms);
    let loss = config.loss_benchmark.normalize(metrics.common.loss_pct);
    let bandwidth = bandwidth_component(member.class, metrics);
    let uptime = uptime_component(metrics);
    let stability = stability_component(metrics);
    let connection_state = connection_state_component(member.class, metrics);
    let signal = signal_component(member.class, metrics);
    let data_usage = data_usage_component(member.class);
    let priority = member.weight as f64;

    let components = [
        ("latency", latency, w.latency),
        ("loss", loss, w.loss),
        ("bandwidth", bandwidth, w.bandwidth),
        ("uptime", uptime, w.uptime),
        ("stability", stability, w.stability),
        ("connection_state", connection_state, w.connection_state),
        ("signal", signal, w.signal),
        ("data_usage", data_usage, w.data_usage),
        ("priority", priority, w.priority),
    ];

    let total_weight = w.sum();
    let score: f64 = components
        .iter()
        .map(|(_, value, weight)| value * weight)
        .sum::<f64>()
        / total_weight.max(1e-9);

    let breakdown = ScoreBreakdown {
        components: components
            .iter()
            .map(|(name, value, _)| (name.to_string(), *value))
            .collect(),
        penalties: Vec::new(),
        bonuses: Vec::new(),
        weights: components
            .iter()
            .map(|(name, _, weight)| (name.to_string(), *weight))
            .collect(),
    };

    (score.clamp(0.0, 100.0), breakdown)
}
