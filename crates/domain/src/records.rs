//! Persisted records shared by the storage backends and their callers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::{IdentityKind, SubjectKey};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Usage
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One subject's usage window for one period date.
///
/// `usage_minutes` is the elapsed span between `first_used_at` and
/// `last_used_at`, not a sum of call durations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsagePeriodRecord {
    pub subject_key: SubjectKey,
    pub period_date: NaiveDate,
    pub first_used_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub usage_minutes: i64,
    pub is_guest: bool,
}

impl UsagePeriodRecord {
    /// A fresh record opened at `now`.
    pub fn open(
        subject_key: SubjectKey,
        period_date: NaiveDate,
        now: DateTime<Utc>,
        is_guest: bool,
    ) -> Self {
        Self {
            subject_key,
            period_date,
            first_used_at: now,
            last_used_at: now,
            usage_minutes: 0,
            is_guest,
        }
    }
}

/// Whole minutes elapsed from `from` to `to`, clamped at zero.
pub fn elapsed_minutes(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_minutes().max(0)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: i64,
    pub subject_key: SubjectKey,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: i64,
    pub conversation_id: i64,
    pub input_text: String,
    pub output_text: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A conversation together with every turn, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationDetail {
    pub conversation: ConversationRecord,
    pub turns: Vec<ConversationTurn>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Guests & users
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestRecord {
    pub kind: IdentityKind,
    pub identifier: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub name: String,
    pub subscription_active: bool,
    /// Hex-encoded SHA-256 of the user's bearer token.
    #[serde(skip_serializing, default)]
    pub token_sha256: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn elapsed_minutes_truncates_partial_minutes() {
        let t0 = Utc::now();
        assert_eq!(elapsed_minutes(t0, t0 + Duration::seconds(59)), 0);
        assert_eq!(elapsed_minutes(t0, t0 + Duration::seconds(61)), 1);
        assert_eq!(elapsed_minutes(t0, t0 + Duration::minutes(11)), 11);
    }

    #[test]
    fn elapsed_minutes_never_negative() {
        let t0 = Utc::now();
        assert_eq!(elapsed_minutes(t0, t0 - Duration::minutes(5)), 0);
    }
}
