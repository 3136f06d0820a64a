use serde::Serialize;

use cg_domain::config::EntitlementConfig;
use cg_domain::Identity;

/// How much a subject may use per period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "minutes")]
pub enum Quota {
    Unlimited,
    Minutes(i64),
}

impl Quota {
    pub fn is_unlimited(self) -> bool {
        matches!(self, Quota::Unlimited)
    }

    /// The minute limit, or `None` when unlimited.
    pub fn minutes(self) -> Option<i64> {
        match self {
            Quota::Unlimited => None,
            Quota::Minutes(m) => Some(m),
        }
    }

    /// `true` once `used_minutes` has reached the limit.
    pub fn is_exhausted_by(self, used_minutes: i64) -> bool {
        match self {
            Quota::Unlimited => false,
            Quota::Minutes(limit) => used_minutes >= limit,
        }
    }
}

/// Maps an identity to its daily quota.  Pure and side-effect free.
#[derive(Debug, Clone)]
pub struct EntitlementPolicy {
    unsubscribed_daily_minutes: i64,
    guest_daily_minutes: i64,
}

impl EntitlementPolicy {
    pub fn new(config: &EntitlementConfig) -> Self {
        Self {
            unsubscribed_daily_minutes: config.unsubscribed_daily_minutes,
            guest_daily_minutes: config.guest_daily_minutes,
        }
    }

    pub fn quota(&self, identity: &Identity) -> Quota {
        match identity {
            Identity::AuthenticatedUser {
                subscription_active: true,
                ..
            } => Quota::Unlimited,
            Identity::AuthenticatedUser { .. } => Quota::Minutes(self.unsubscribed_daily_minutes),
            Identity::GuestByDevice { .. } | Identity::GuestByToken { .. } => {
                Quota::Minutes(self.guest_daily_minutes)
            }
        }
    }
}

impl Default for EntitlementPolicy {
    fn default() -> Self {
        Self::new(&EntitlementConfig::default())
    }
}
