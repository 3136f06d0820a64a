//! Request credential extraction.
//!
//! Reads the three credential sources a caller may present:
//! - `Authorization: Bearer <token>` for registered users
//! - `X-Visitor-ID` for device-bound guests
//! - `Guest-Token` for token-bound guests
//!
//! Precedence between them is decided by the identity resolver, not here.

use std::convert::Infallible;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};

use cg_conversations::Credentials;
use cg_domain::Identity;

use crate::api::error::{rejected, ApiResult};
use crate::state::AppState;

pub const VISITOR_HEADER: &str = "x-visitor-id";
pub const GUEST_TOKEN_HEADER: &str = "guest-token";

/// Owned copy of the credential headers, borrowed as [`Credentials`].
#[derive(Debug, Clone, Default)]
pub struct RequestCredentials {
    bearer: Option<String>,
    visitor_id: Option<String>,
    guest_token: Option<String>,
}

impl RequestCredentials {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };
        let bearer = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_owned);

        Self {
            bearer,
            visitor_id: read(VISITOR_HEADER),
            guest_token: read(GUEST_TOKEN_HEADER),
        }
    }

    pub fn as_credentials(&self) -> Credentials<'_> {
        Credentials {
            bearer: self.bearer.as_deref(),
            visitor_id: self.visitor_id.as_deref(),
            guest_token: self.guest_token.as_deref(),
        }
    }

    pub fn visitor_id(&self) -> Option<&str> {
        self.visitor_id.as_deref()
    }

    /// Resolve the caller for a read endpoint.  A failure is logged before
    /// it becomes the response.
    pub async fn resolve(&self, state: &AppState, now: DateTime<Utc>) -> ApiResult<Identity> {
        state
            .resolver
            .resolve(self.as_credentials(), now)
            .await
            .map_err(|e| rejected(e, None, None))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestCredentials
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}
