//! `GET /events` — audit events since a timestamp (§6 `events(since, limit)`).

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use wanctl_core::model::DecisionEvent;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    since: Option<DateTime<Utc>>,
    limit: Option<usize>,
}

pub async fn handler(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Json<Vec<DecisionEvent>> {
    let since = query.since.unwrap_or(DateTime::UNIX_EPOCH);
    let limit = query.limit.unwrap_or(100);
    Json(state.shared().store.events_since(since, limit))
}
