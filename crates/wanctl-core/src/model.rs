//! Core data model: members, metrics, samples, scores.
//!
//! `Metrics` is a tagged variant over link classes with a shared common
//! header — only the fields relevant to `member.class` are ever populated,
//! per the invariant in the specification's data model section.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The class of uplink a [`Member`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberClass {
    Starlink,
    Cellular,
    Wifi,
    Lan,
    Vpn,
}

impl MemberClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberClass::Starlink => "starlink",
            MemberClass::Cellular => "cellular",
            MemberClass::Wifi => "wifi",
            MemberClass::Lan => "lan",
            MemberClass::Vpn => "vpn",
        }
    }

    /// Whether this class is metered (affects sampler floor, §4.3).
    pub fn is_metered(&self) -> bool {
        matches!(self, MemberClass::Cellular)
    }

    /// Default class-priority used as the final tie-break key (§9 open
    /// question: resolved as `(score, weight, class_priority)`).
    pub fn default_priority(&self) -> u8 {
        match self {
            MemberClass::Lan => 5,
            MemberClass::Vpn => 4,
            MemberClass::Starlink => 3,
            MemberClass::Wifi => 2,
            MemberClass::Cellular => 1,
        }
    }
}

impl fmt::Display for MemberClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MemberClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starlink" => Ok(MemberClass::Starlink),
            "cellular" => Ok(MemberClass::Cellular),
            "wifi" => Ok(MemberClass::Wifi),
            "lan" => Ok(MemberClass::Lan),
            "vpn" => Ok(MemberClass::Vpn),
            other => Err(format!("unknown member class: {other}")),
        }
    }
}

/// Starlink dish reboot-state enum (§3 metrics.starlink.reboot_state).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebootState {
    #[default]
    Idle,
    Scheduled,
    RebootRequired,
    UpdateApplied,
}

/// Cellular modem registration state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationState {
    #[default]
    Unknown,
    Registered,
    Roaming,
    Searching,
    Denied,
}

/// Metrics common to every member class, always populated.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CommonMetrics {
    pub latency_ms: f64,
    pub loss_pct: f64,
    pub jitter_ms: f64,
}

/// Starlink-only fields, populated when `member.class == Starlink`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StarlinkMetrics {
    pub obstruction_pct: f64,
    pub time_obstructed_pct: f64,
    pub avg_prolonged_obstruction_s: f64,
    pub patches_valid: u32,
    pub valid_s: f64,
    pub snr_db: f64,
    pub pop_ping_drop_rate: f64,
    pub uplink_throughput: f64,
    pub downlink_throughput: f64,
    pub reboot_state: RebootState,
    pub reboot_time_epoch: Option<i64>,
}

/// Cellular-only fields, populated when `member.class == Cellular`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CellularMetrics {
    pub rsrp: f64,
    pub rsrq: f64,
    pub sinr: f64,
    pub signal_pct: f64,
    pub network_type: String,
    pub operator: String,
    pub band: String,
    pub cell_id: String,
    pub roaming: bool,
    pub thermal_c: f64,
    pub registration_state: RegistrationState,
}

/// Wi-Fi-only fields, populated when `member.class == Wifi`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WifiMetrics {
    pub signal_dbm: f64,
    pub noise_dbm: f64,
    pub bitrate: f64,
}

/// Link-layer byte/error counters, populated for all classes when available.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LinkCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_errors: u64,
    pub tx_errors: u64,
}

/// Class-specific metrics payload. Exactly one variant's data is meaningful
/// for a given member; the others are `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub starlink: Option<StarlinkMetrics>,
    pub cellular: Option<CellularMetrics>,
    pub wifi: Option<WifiMetrics>,
}

/// A full metrics reading for one member at one point in time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub common: CommonMetrics,
    pub class: ClassMetrics,
    pub link: LinkCounters,
}

impl Metrics {
    /// Metrics with only the common + link fields, used by collectors for
    /// classes that don't have a class-specific payload (lan/vpn).
    pub fn common_only(common: CommonMetrics, link: LinkCounters) -> Self {
        Metrics {
            common,
            class: ClassMetrics::default(),
            link,
        }
    }
}

/// Component weight/penalty breakdown kept alongside a [`Score`] for
/// auditability (§3, §4.8).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub components: Vec<(String, f64)>,
    pub penalties: Vec<(String, f64)>,
    pub bonuses: Vec<(String, f64)>,
    pub weights: Vec<(String, f64)>,
}

/// A member's score at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Score {
    pub instant: f64,
    pub ewma: f64,
    pub final_score: f64,
    pub updated_at: DateTime<Utc>,
    pub breakdown: ScoreBreakdown,
}

impl Default for Score {
    fn default() -> Self {
        Score {
            instant: 0.0,
            ewma: 0.0,
            final_score: 0.0,
            updated_at: DateTime::UNIX_EPOCH,
            breakdown: ScoreBreakdown::default(),
        }
    }
}

/// One collector reading stored in the telemetry ring buffer. Immutable once
/// stored (§3 invariant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub member: String,
    pub metrics: Metrics,
    pub instant_score: f64,
    pub ewma_score: f64,
    pub final_score: f64,
    pub breakdown: ScoreBreakdown,
}

impl Sample {
    /// Rough heap footprint used by the telemetry store's byte budget.
    /// Deliberately approximate — the store only needs an order-of-magnitude
    /// figure to decide when to downsample.
    pub fn approx_size_bytes(&self) -> usize {
        std::mem::size_of::<Sample>() + self.member.len()
    }
}

/// The kind of a [`DecisionEvent`] (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Evaluation,
    Action,
    Recovery,
    Error,
}

/// A single record of the decision engine's reasoning, written to the audit
/// log and kept in the telemetry store's event ring for `events()` queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionEvent {
    pub timestamp: DateTime<Utc>,
    pub event_id: u64,
    pub kind: EventKind,
    pub from: Option<String>,
    pub to: Option<String>,
    pub reason: String,
    pub confidence: f64,
    pub thresholds: Vec<(String, f64)>,
    pub breakdowns: Vec<(String, ScoreBreakdown)>,
}

/// Apply lifecycle status for a [`Plan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Pending,
    Applied,
    Verified,
    Failed,
}

/// The controller's record of the last apply attempt (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub desired_primary: String,
    pub applied_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
    pub status: PlanStatus,
}
