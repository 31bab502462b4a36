//! Local RPC surface (§6): `status`, `members`, `metrics`, `events`,
//! `set_primary`. Grounded on `strata_control::api`'s router-nesting and
//! `ApiError` patterns, trimmed to the unauthenticated local-only surface
//! §6 calls for (no JWT layer here — this binds to loopback or a UDS).

pub mod events;
pub mod members;
pub mod metrics;
pub mod set_primary;
pub mod status;

use axum::http::StatusCode;
use axum::{Json, Router};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status", axum::routing::get(status::handler))
        .route("/members", axum::routing::get(members::handler))
        .route("/metrics/{member}", axum::routing::get(metrics::handler))
        .route("/events", axum::routing::get(events::handler))
        .route("/set_primary", axum::routing::post(set_primary::handler))
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::CONFLICT,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
        }
    }
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}
