//! Bounded in-RAM telemetry store (§4.4).

mod store;

pub use store::TelemetryStore;
