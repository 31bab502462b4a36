//! `GET /status` — current primary, per-member final score, last decision,
//! daemon uptime (§6).

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct MemberStatus {
    pub member: String,
    pub final_score: f64,
    pub eligible: bool,
    pub is_primary: bool,
}

#[derive(Debug, Serialize)]
pub struct DecisionSummary {
    pub kind: String,
    pub from: Option<String>,
    pub to: Option<String>,
    pub reason: String,
    pub timestamp: chrono::DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub current_primary: Option<String>,
    pub backend: &'static str,
    pub uptime_s: i64,
    pub members: Vec<MemberStatus>,
    pub last_decision: Option<DecisionSummary>,
}

pub async fn handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let shared = state.shared();
    let current_primary = shared
        .decision
        .lock()
        .expect("decision mutex poisoned")
        .current_primary()
        .map(str::to_string);

    let members: Vec<MemberStatus> = {
        let registry = shared.registry.lock().expect("registry mutex poisoned");
        registry
            .all()
            .map(|m| {
                let final_score = shared
                    .store
                    .latest(&m.name)
                    .map(|s| s.final_score)
                    .unwrap_or(0.0);
                MemberStatus {
                    member: m.name.clone(),
                    final_score,
                    eligible: m.eligible,
                    is_primary: current_primary.as_deref() == Some(m.name.as_str()),
                }
            })
            .collect()
    };

    let last_decision = shared
        .store
        .events_since(chrono::DateTime::UNIX_EPOCH, 1)
        .pop()
        .map(|e| DecisionSummary {
            kind: format!("{:?}", e.kind),
            from: e.from,
            to: e.to,
            reason: e.reason,
            timestamp: e.timestamp,
        });

    Json(StatusResponse {
        current_primary,
        backend: shared.controller.backend_name(),
        uptime_s: (Utc::now() - shared.started_at).num_seconds().max(0),
        members,
        last_decision,
    })
}
