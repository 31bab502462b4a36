//! Core library for the multi-WAN failover controller.
//!
//! This crate contains:
//! - **Configuration** — key=value text config with defaulted resolution
//! - **Data model** — members, samples, metrics, scores, decisions, plans
//! - **Registry** — member discovery and reconciliation
//! - **Telemetry** — ring-buffered sample and event storage
//! - **Scoring** — Kalman/EWMA smoothing and the weighted composite score
//! - **Sampler** — adaptive per-member collection cadence
//! - **Decision engine** — the failover/failback state machine
//! - **Controller** — policy-mwan and route-metric back-ends
//! - **Audit** — append-only JSON-lines decision log
//! - **Collectors** — per-class telemetry collection

pub mod audit;
pub mod config;
pub mod controller;
pub mod decision;
pub mod error;
pub mod model;
pub mod registry;
pub mod sampler;
pub mod scoring;
pub mod telemetry;

pub mod collectors;

pub use config::Config;
pub use error::{AuditError, CollectorError, ConfigError, ControllerError, StoreError};
pub use model::{
    ClassMetrics, CommonMetrics, DecisionEvent, EventKind, LinkCounters, MemberClass, Metrics,
    Plan, PlanStatus, RebootState, RegistrationState, Sample, Score, ScoreBreakdown,
};
pub use registry::{Member, Registry};
pub use telemetry::TelemetryStore;
