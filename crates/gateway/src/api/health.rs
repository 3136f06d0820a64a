//! Liveness endpoint.

use axum::extract::State;
use axum::response::Response;
use serde_json::json;

use crate::api::error::ok;
use crate::state::AppState;

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Response {
    ok(
        "ok",
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "uptime_secs": state.started_at.elapsed().as_secs(),
            "storage": state.config.storage.backend,
            "completion_gateway": state.gateway.as_ref().map(|g| g.model()),
        }),
    )
}
