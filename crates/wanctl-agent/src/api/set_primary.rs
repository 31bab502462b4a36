//! `POST /set_primary` — manual override (§6 `set_primary(member,
//! force=false)`, honoured only with `force` during cooldown).

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SetPrimaryRequest {
    pub member: String,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct SetPrimaryResponse {
    pub primary: String,
}

pub async fn handler(
    State(state): State<AppState>,
    Json(body): Json<SetPrimaryRequest>,
) -> Result<Json<SetPrimaryResponse>, ApiError> {
    let shared = state.shared();
    let members: Vec<wanctl_core::registry::Member> = {
        let registry = shared.registry.lock().expect("registry mutex poisoned");
        registry.all().cloned().collect()
    };

    if !members.iter().any(|m| m.name == body.member) {
        return Err(ApiError::not_found(format!(
            "unknown member `{}`",
            body.member
        )));
    }

    match shared.controller.set_primary(&members, &body.member, body.force) {
        Ok(()) => {
            shared
                .decision
                .lock()
                .expect("decision mutex poisoned")
                .set_initial_primary(body.member.clone());
            Ok(Json(SetPrimaryResponse {
                primary: body.member,
            }))
        }
        Err(Ok(remaining)) => Err(ApiError::conflict(format!(
            "cooldown active, {}s remaining",
            remaining.0.as_secs()
        ))),
        Err(Err(err)) => Err(ApiError::internal(err.to_string())),
    }
}
