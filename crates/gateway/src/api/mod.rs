pub mod auth;
pub mod conversations;
pub mod error;
pub mod health;
pub mod usage;
pub mod visitor;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub use error::{ApiError, ApiResult};

/// Build the full API router.
///
/// `/health` is public. Every `/v1` route resolves the caller's identity
/// from the bearer token or a guest header inside its handler.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/v1/visitor", post(visitor::register_visitor))
        .route(
            "/v1/conversations",
            get(conversations::list_conversations).post(conversations::store_conversation),
        )
        .route("/v1/conversations/:id", get(conversations::get_conversation))
        .route("/v1/usage", get(usage::get_usage))
}
