//! Entitlement policy and the per-subject daily usage ledger.

pub mod entitlement;
pub mod ledger;
pub mod subject_lock;

pub use entitlement::{EntitlementPolicy, Quota};
pub use ledger::{Reservation, UsageLedger, UsageStatus};
pub use subject_lock::SubjectLockMap;
