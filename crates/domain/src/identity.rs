//! Request identities and the subject keys they meter under.
//!
//! Every request resolves to exactly one [`Identity`].  The identity's
//! [`SubjectKey`] is the canonical string used to key usage records and
//! conversation ownership: `user:<id>`, `device:<id>`, or `guest:<token>`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The caller a request is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Identity {
    AuthenticatedUser { id: i64, subscription_active: bool },
    GuestByDevice { device_id: String },
    GuestByToken { guest_token: String },
}

/// Identity variant without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    User,
    Device,
    GuestToken,
}

impl IdentityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IdentityKind::User => "user",
            IdentityKind::Device => "device",
            IdentityKind::GuestToken => "guest",
        }
    }

    /// Inverse of [`IdentityKind::as_str`].
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "user" => Some(IdentityKind::User),
            "device" => Some(IdentityKind::Device),
            "guest" => Some(IdentityKind::GuestToken),
            _ => None,
        }
    }
}

impl Identity {
    pub fn kind(&self) -> IdentityKind {
        match self {
            Identity::AuthenticatedUser { .. } => IdentityKind::User,
            Identity::GuestByDevice { .. } => IdentityKind::Device,
            Identity::GuestByToken { .. } => IdentityKind::GuestToken,
        }
    }

    pub fn is_guest(&self) -> bool {
        !matches!(self, Identity::AuthenticatedUser { .. })
    }

    /// `true` only for authenticated users with an active subscription.
    pub fn is_subscribed(&self) -> bool {
        matches!(
            self,
            Identity::AuthenticatedUser {
                subscription_active: true,
                ..
            }
        )
    }

    /// The authenticated user id, if any.
    pub fn user_id(&self) -> Option<i64> {
        match self {
            Identity::AuthenticatedUser { id, .. } => Some(*id),
            _ => None,
        }
    }

    pub fn subject_key(&self) -> SubjectKey {
        let raw = match self {
            Identity::AuthenticatedUser { id, .. } => id.to_string(),
            Identity::GuestByDevice { device_id } => device_id.clone(),
            Identity::GuestByToken { guest_token } => guest_token.clone(),
        };
        SubjectKey::new(self.kind(), &raw)
    }
}

/// Canonical, prefixed subject identifier (e.g. `device:abc`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectKey(String);

impl SubjectKey {
    pub fn new(kind: IdentityKind, raw: &str) -> Self {
        Self(format!("{}:{raw}", kind.as_str()))
    }

    /// Wrap an already-prefixed key loaded from storage.
    pub fn from_stored(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse the user id back out of a `user:<id>` key.
    pub fn user_id(&self) -> Option<i64> {
        self.0.strip_prefix("user:").and_then(|id| id.parse().ok())
    }
}

impl fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
