//! `GET /members` — the registry (§6).

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct MemberView {
    pub name: String,
    pub class: wanctl_core::model::MemberClass,
    pub iface: String,
    pub weight: u8,
    pub policy_group: String,
    pub eligible: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_seen: chrono::DateTime<chrono::Utc>,
}

impl From<&wanctl_core::registry::Member> for MemberView {
    fn from(m: &wanctl_core::registry::Member) -> Self {
        MemberView {
            name: m.name.clone(),
            class: m.class,
            iface: m.iface.clone(),
            weight: m.weight,
            policy_group: m.policy_group.clone(),
            eligible: m.eligible,
            created_at: m.created_at,
            last_seen: m.last_seen,
        }
    }
}

pub async fn handler(State(state): State<AppState>) -> Json<Vec<MemberView>> {
    let registry = state
        .shared()
        .registry
        .lock()
        .expect("registry mutex poisoned");
    Json(registry.all().map(MemberView::from).collect())
}
