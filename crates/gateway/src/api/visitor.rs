//! `POST /v1/visitor`: validate the caller's `X-Visitor-ID`, or mint one.

use axum::extract::State;
use axum::response::Response;
use serde_json::json;

use crate::api::auth::RequestCredentials;
use crate::api::error::{ok, rejected, ApiResult};
use crate::state::AppState;

pub async fn register_visitor(
    State(state): State<AppState>,
    credentials: RequestCredentials,
) -> ApiResult<Response> {
    let (visitor_id, created) = state
        .resolver
        .register_visitor(credentials.visitor_id(), chrono::Utc::now())
        .await
        .map_err(|e| rejected(e, None, None))?;

    Ok(ok(
        "Visitor ID generated or validated successfully",
        json!({ "visitor_id": visitor_id, "created": created }),
    ))
}
