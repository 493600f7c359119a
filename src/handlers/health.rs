use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

use crate::state::AppState;

const CACHE_CONTROL_NO_CACHE: &str = "no-cache, no-store, must-revalidate";

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(
            axum::http::header::CACHE_CONTROL,
            axum::http::HeaderValue::from_static(CACHE_CONTROL_NO_CACHE),
        )],
        Json(json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "auth_mode": state.relay.auth_mode(),
            "model": state.relay.model(),
            "region": state.config.relay.region,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
}
