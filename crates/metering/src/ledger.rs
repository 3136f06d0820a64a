//! Daily usage accounting per subject.
//!
//! Usage is the elapsed span between a subject's first and last committed
//! action of the period date, in whole minutes.  A check opens the day's
//! record if needed and compares the span up to `now` against the quota.
//! The [`Reservation`] it returns holds the subject's lock until it is
//! committed or dropped.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tokio::sync::OwnedSemaphorePermit;

use cg_domain::error::{Error, Result};
use cg_domain::records::{elapsed_minutes, UsagePeriodRecord};
use cg_domain::trace::TraceEvent;
use cg_domain::{Identity, SubjectKey};
use cg_storage::UsageStore;

use crate::entitlement::{EntitlementPolicy, Quota};
use crate::subject_lock::SubjectLockMap;

/// Commits retry this many times when the record moved underneath them.
const MAX_COMMIT_ATTEMPTS: usize = 3;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An allowed usage check, pending commit.
///
/// Dropping it without calling [`UsageLedger::commit`] releases the
/// subject's lock and writes nothing.
#[must_use = "a reservation does nothing unless committed"]
pub struct Reservation {
    subject_key: SubjectKey,
    quota: Quota,
    /// `None` for unlimited subjects, which never touch the store.
    record: Option<UsagePeriodRecord>,
    used_minutes: i64,
    _permit: Option<OwnedSemaphorePermit>,
}

impl Reservation {
    pub fn subject_key(&self) -> &SubjectKey {
        &self.subject_key
    }

    pub fn quota(&self) -> Quota {
        self.quota
    }

    /// Minutes used as of the check.
    pub fn used_minutes(&self) -> i64 {
        self.used_minutes
    }

    pub fn is_unlimited(&self) -> bool {
        self.record.is_none()
    }
}

impl std::fmt::Debug for Reservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation")
            .field("subject_key", &self.subject_key)
            .field("quota", &self.quota)
            .field("used_minutes", &self.used_minutes)
            .finish()
    }
}

/// Today's usage for one subject.
#[derive(Debug, Clone, Serialize)]
pub struct UsageStatus {
    pub subject_key: SubjectKey,
    pub period_date: NaiveDate,
    pub used_minutes: i64,
    /// `None` when unlimited.
    pub limit_minutes: Option<i64>,
    pub remaining_minutes: Option<i64>,
    pub unlimited: bool,
    pub allowed: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// UsageLedger
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct UsageLedger {
    store: Arc<dyn UsageStore>,
    policy: EntitlementPolicy,
    timezone: Tz,
    locks: SubjectLockMap,
}

impl UsageLedger {
    pub fn new(store: Arc<dyn UsageStore>, policy: EntitlementPolicy, timezone: Tz) -> Self {
        Self {
            store,
            policy,
            timezone,
            locks: SubjectLockMap::new(),
        }
    }

    pub fn policy(&self) -> &EntitlementPolicy {
        &self.policy
    }

    /// The period date `now` falls on in the configured timezone.
    pub fn period_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.timezone).date_naive()
    }

    /// Gate a request.
    ///
    /// Returns `QuotaExceeded` without mutating the record when the
    /// subject's span up to `now` has reached its quota.
    pub async fn check_and_reserve(
        &self,
        identity: &Identity,
        now: DateTime<Utc>,
    ) -> Result<Reservation> {
        let subject_key = identity.subject_key();
        let quota = self.policy.quota(identity);
        let period_date = self.period_date(now);

        if quota.is_unlimited() {
            TraceEvent::UsageChecked {
                subject_key: subject_key.to_string(),
                period_date: period_date.to_string(),
                used_minutes: 0,
                limit_minutes: None,
                allowed: true,
            }
            .emit();
            return Ok(Reservation {
                subject_key,
                quota,
                record: None,
                used_minutes: 0,
                _permit: None,
            });
        }

        let permit = self.locks.acquire(&subject_key).await?;

        let record = match self.store.get_usage(&subject_key, period_date).await? {
            Some(record) => record,
            None => {
                self.store
                    .open_usage(UsagePeriodRecord::open(
                        subject_key.clone(),
                        period_date,
                        now,
                        identity.is_guest(),
                    ))
                    .await?
            }
        };

        let used_minutes = elapsed_minutes(record.first_used_at, now);
        let allowed = !quota.is_exhausted_by(used_minutes);

        TraceEvent::UsageChecked {
            subject_key: subject_key.to_string(),
            period_date: period_date.to_string(),
            used_minutes,
            limit_minutes: quota.minutes(),
            allowed,
        }
        .emit();

        if !allowed {
            return Err(Error::QuotaExceeded {
                used_minutes,
                limit_minutes: quota.minutes().unwrap_or_default(),
            });
        }

        Ok(Reservation {
            subject_key,
            quota,
            record: Some(record),
            used_minutes,
            _permit: Some(permit),
        })
    }

    /// Record the reserved action as happening at `now`.
    ///
    /// Returns the stored record, or `None` for unlimited subjects.
    pub async fn commit(
        &self,
        reservation: Reservation,
        now: DateTime<Utc>,
    ) -> Result<Option<UsagePeriodRecord>> {
        let Some(mut expected) = reservation.record.clone() else {
            return Ok(None);
        };

        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let last_used_at = now.max(expected.last_used_at).max(expected.first_used_at);
            let next = UsagePeriodRecord {
                last_used_at,
                usage_minutes: elapsed_minutes(expected.first_used_at, last_used_at),
                ..expected.clone()
            };

            if self.store.commit_usage(&next, expected.last_used_at).await? {
                TraceEvent::UsageCommitted {
                    subject_key: next.subject_key.to_string(),
                    period_date: next.period_date.to_string(),
                    usage_minutes: next.usage_minutes,
                }
                .emit();
                return Ok(Some(next));
            }

            tracing::debug!(
                subject_key = %next.subject_key,
                attempt,
                "usage record changed before commit, reloading"
            );
            expected = self
                .store
                .get_usage(&next.subject_key, next.period_date)
                .await?
                .ok_or_else(|| Error::Storage("usage record disappeared before commit".into()))?;
        }

        Err(Error::Storage(format!(
            "usage commit for {} kept conflicting",
            reservation.subject_key
        )))
    }

    /// Read-only view of today's usage for `identity`.
    pub async fn status(&self, identity: &Identity, now: DateTime<Utc>) -> Result<UsageStatus> {
        let subject_key = identity.subject_key();
        let quota = self.policy.quota(identity);
        let period_date = self.period_date(now);

        let used_minutes = if quota.is_unlimited() {
            0
        } else {
            self.store
                .get_usage(&subject_key, period_date)
                .await?
                .map(|r| elapsed_minutes(r.first_used_at, now))
                .unwrap_or(0)
        };

        Ok(UsageStatus {
            subject_key,
            period_date,
            used_minutes,
            limit_minutes: quota.minutes(),
            remaining_minutes: quota.minutes().map(|limit| (limit - used_minutes).max(0)),
            unlimited: quota.is_unlimited(),
            allowed: !quota.is_exhausted_by(used_minutes),
        })
    }
}
