//! Shared application state for the RPC surface (§6).
//!
//! Grounded on `strata_control::state::AppState`'s `Arc<Inner>` wrapper,
//! but there's no pool or JWT context here: the whole daemon already has
//! one `Shared` handle (`crate::scheduler::Shared`) that the collector
//! and decision threads use directly, so this just re-exposes it to
//! axum handlers behind a `Clone` newtype.

use std::sync::Arc;

use crate::scheduler::Shared;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<Shared>,
}

impl AppState {
    pub fn new(inner: Arc<Shared>) -> Self {
        AppState { inner }
    }

    pub fn shared(&self) -> &Shared {
        &self.inner
    }
}
