//! `GET /metrics/{member}` — recent samples for one member (§6
//! `metrics(member, since)`).

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use wanctl_core::model::Sample;

use crate::api::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    since: Option<DateTime<Utc>>,
    limit: Option<usize>,
}

pub async fn handler(
    State(state): State<AppState>,
    Path(member): Path<String>,
    Query(query): Query<MetricsQuery>,
) -> Result<Json<Vec<Sample>>, ApiError> {
    let shared = state.shared();
    {
        let registry = shared.registry.lock().expect("registry mutex poisoned");
        if registry.get(&member).is_none() {
            return Err(ApiError::not_found(format!("unknown member `{member}`")));
        }
    }

    let limit = query.limit.unwrap_or(256);
    let samples = shared.store.snapshot(&member, limit);
    let since = query.since.unwrap_or(DateTime::UNIX_EPOCH);
    Ok(Json(
        samples.into_iter().filter(|s| s.timestamp >= since).collect(),
    ))
}
