//! Resolve request credentials into exactly one [`Identity`].
//!
//! Precedence: bearer token, then `X-Visitor-ID`, then `Guest-Token`.  A
//! bearer token that fails authentication is rejected outright; it never
//! falls back to a guest identity.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};

use cg_domain::error::{Error, Result};
use cg_domain::trace::TraceEvent;
use cg_domain::{Identity, IdentityKind, SubjectKey};
use cg_storage::{GuestStore, UserStore};

const GUEST_ID_PATTERN: &str = r"^[A-Za-z0-9_.\-]{1,128}$";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Authentication
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A user whose bearer token checked out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub subscription_active: bool,
}

impl AuthenticatedUser {
    pub fn into_identity(self) -> Identity {
        Identity::AuthenticatedUser {
            id: self.id,
            subscription_active: self.subscription_active,
        }
    }
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// `Ok(None)` means the token is unknown.
    async fn authenticate(&self, bearer: &str) -> Result<Option<AuthenticatedUser>>;
}

/// Hex SHA-256 of a bearer token, as stored in `users.token_sha256`.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Fresh random bearer token for a new user.
pub fn mint_user_token() -> String {
    format!("cg_{}", uuid::Uuid::new_v4().simple())
}

/// Looks bearer tokens up by hash in the user store.
pub struct TokenAuthenticator {
    users: Arc<dyn UserStore>,
}

impl TokenAuthenticator {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl Authenticator for TokenAuthenticator {
    async fn authenticate(&self, bearer: &str) -> Result<Option<AuthenticatedUser>> {
        if bearer.is_empty() {
            return Ok(None);
        }
        let user = self.users.find_user_by_token_hash(&hash_token(bearer)).await?;
        Ok(user.map(|u| AuthenticatedUser {
            id: u.id,
            subscription_active: u.subscription_active,
        }))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Resolver
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Raw credentials pulled off a request.  Blank values count as absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct Credentials<'a> {
    pub bearer: Option<&'a str>,
    pub visitor_id: Option<&'a str>,
    pub guest_token: Option<&'a str>,
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

pub struct IdentityResolver {
    authenticator: Arc<dyn Authenticator>,
    guests: Arc<dyn GuestStore>,
    guest_id: Regex,
}

impl IdentityResolver {
    pub fn new(authenticator: Arc<dyn Authenticator>, guests: Arc<dyn GuestStore>) -> Result<Self> {
        let guest_id = Regex::new(GUEST_ID_PATTERN)
            .map_err(|e| Error::Config(format!("guest id pattern: {e}")))?;
        Ok(Self {
            authenticator,
            guests,
            guest_id,
        })
    }

    pub async fn resolve(&self, credentials: Credentials<'_>, now: DateTime<Utc>) -> Result<Identity> {
        let identity = if let Some(bearer) = present(credentials.bearer) {
            self.authenticator
                .authenticate(bearer)
                .await?
                .ok_or_else(|| Error::Unauthenticated("invalid bearer token".into()))?
                .into_identity()
        } else if let Some(device_id) = present(credentials.visitor_id) {
            let device_id = self.check_guest_id(device_id, "X-Visitor-ID")?;
            self.ensure_guest(IdentityKind::Device, device_id, now).await?;
            Identity::GuestByDevice {
                device_id: device_id.to_owned(),
            }
        } else if let Some(token) = present(credentials.guest_token) {
            let token = self.check_guest_id(token, "Guest-Token")?;
            self.ensure_guest(IdentityKind::GuestToken, token, now).await?;
            Identity::GuestByToken {
                guest_token: token.to_owned(),
            }
        } else {
            return Err(Error::Unauthenticated(
                "a bearer token, X-Visitor-ID, or Guest-Token header is required".into(),
            ));
        };

        TraceEvent::IdentityResolved {
            subject_key: identity.subject_key().to_string(),
            kind: identity.kind().as_str(),
        }
        .emit();
        Ok(identity)
    }

    /// Validate a caller-chosen visitor id, or mint one, and make sure its
    /// device record exists.  Returns `(visitor_id, created)`.
    pub async fn register_visitor(
        &self,
        requested: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(String, bool)> {
        let visitor_id = match present(requested) {
            Some(id) => self.check_guest_id(id, "visitor_id")?.to_owned(),
            None => uuid::Uuid::new_v4().simple().to_string(),
        };
        let created = self
            .ensure_guest(IdentityKind::Device, &visitor_id, now)
            .await?;
        Ok((visitor_id, created))
    }

    /// Find or create the guest record, announcing first sightings.
    async fn ensure_guest(&self, kind: IdentityKind, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let (_, created) = self.guests.find_or_create_guest(kind, id, now).await?;
        if created {
            TraceEvent::GuestRegistered {
                subject_key: SubjectKey::new(kind, id).to_string(),
            }
            .emit();
        }
        Ok(created)
    }

    fn check_guest_id<'a>(&self, raw: &'a str, field: &str) -> Result<&'a str> {
        if self.guest_id.is_match(raw) {
            Ok(raw)
        } else {
            Err(Error::Validation(format!(
                "{field} must be 1-128 characters of letters, digits, '_', '.' or '-'"
            )))
        }
    }
}
