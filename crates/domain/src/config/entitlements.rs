use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Daily usage allowances per identity class.
///
/// Subscribed users are always unlimited and have no knob here.  The
/// period date used to bucket usage is computed in `period_timezone`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitlementConfig {
    /// Daily minutes for signed-in users without a subscription.
    #[serde(default = "d_30")]
    pub unsubscribed_daily_minutes: i64,
    /// Daily minutes for device- or token-identified guests.
    #[serde(default = "d_10")]
    pub guest_daily_minutes: i64,
    /// IANA zone name (e.g. `"UTC"`, `"Asia/Dhaka"`).
    #[serde(default = "d_utc")]
    pub period_timezone: String,
}

impl Default for EntitlementConfig {
    fn default() -> Self {
        Self {
            unsubscribed_daily_minutes: 30,
            guest_daily_minutes: 10,
            period_timezone: d_utc(),
        }
    }
}

impl EntitlementConfig {
    /// Parse `period_timezone`.
    pub fn timezone(&self) -> Result<chrono_tz::Tz> {
        self.period_timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|e| Error::Config(format!("invalid period_timezone '{}': {e}", self.period_timezone)))
    }
}

fn d_30() -> i64 {
    30
}
fn d_10() -> i64 {
    10
}
fn d_utc() -> String {
    "UTC".into()
}
