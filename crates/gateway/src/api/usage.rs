//! Usage introspection.
//!
//! - `GET /v1/usage`: today's used and allowed minutes for the caller

use axum::extract::State;
use axum::response::Response;

use crate::api::auth::RequestCredentials;
use crate::api::error::{ok, rejected, ApiResult};
use crate::state::AppState;

pub async fn get_usage(
    State(state): State<AppState>,
    credentials: RequestCredentials,
) -> ApiResult<Response> {
    let now = chrono::Utc::now();
    let identity = credentials.resolve(&state, now).await?;
    let status = state
        .ledger
        .status(&identity, now)
        .await
        .map_err(|e| rejected(e, Some(&identity.subject_key()), None))?;
    Ok(ok("Usage retrieved successfully", status))
}
