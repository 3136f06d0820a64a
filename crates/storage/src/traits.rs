use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use cg_domain::identity::{IdentityKind, SubjectKey};
use cg_domain::records::{
    ConversationRecord, ConversationTurn, GuestRecord, UsagePeriodRecord, UserRecord,
};
use cg_domain::Result;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Usage records
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn get_usage(
        &self,
        subject: &SubjectKey,
        period_date: NaiveDate,
    ) -> Result<Option<UsagePeriodRecord>>;

    /// Insert `record` unless one already exists for its (subject, date),
    /// then return whichever record is stored.
    async fn open_usage(&self, record: UsagePeriodRecord) -> Result<UsagePeriodRecord>;

    /// Write `record.last_used_at` and `record.usage_minutes` only if the
    /// stored `last_used_at` still equals `expected_last_used_at`.
    ///
    /// Returns `false` when the record moved underneath the caller or no
    /// longer exists.
    async fn commit_usage(
        &self,
        record: &UsagePeriodRecord,
        expected_last_used_at: DateTime<Utc>,
    ) -> Result<bool>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One completed exchange to persist.
#[derive(Debug, Clone)]
pub struct TurnWrite<'a> {
    pub subject: &'a SubjectKey,
    /// Existing conversation to append to; `None` creates a new one.
    pub conversation_id: Option<i64>,
    /// Name given to a newly created conversation.
    pub name: &'a str,
    pub input_text: &'a str,
    pub output_text: Option<&'a str>,
    pub now: DateTime<Utc>,
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Fetch a conversation only if `subject` owns it.
    async fn get_conversation(
        &self,
        subject: &SubjectKey,
        id: i64,
    ) -> Result<Option<ConversationRecord>>;

    /// All conversations owned by `subject`, most recently updated first.
    async fn list_conversations(&self, subject: &SubjectKey) -> Result<Vec<ConversationRecord>>;

    /// The newest `limit` turns of a conversation, in chronological order.
    async fn recent_turns(&self, conversation_id: i64, limit: usize)
        -> Result<Vec<ConversationTurn>>;

    /// Every turn of a conversation, in chronological order.
    async fn turns(&self, conversation_id: i64) -> Result<Vec<ConversationTurn>>;

    /// Create the conversation if needed and append the turn atomically.
    ///
    /// Fails with `NotFound` when `conversation_id` is set but not owned by
    /// `subject`; nothing is written in that case.
    async fn persist_turn(
        &self,
        write: TurnWrite<'_>,
    ) -> Result<(ConversationRecord, ConversationTurn)>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Guests and users
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
pub trait GuestStore: Send + Sync {
    /// Look up or create a guest record.  Returns `(record, created)`.
    async fn find_or_create_guest(
        &self,
        kind: IdentityKind,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<(GuestRecord, bool)>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(
        &self,
        name: &str,
        token_sha256: &str,
        now: DateTime<Utc>,
    ) -> Result<UserRecord>;

    async fn get_user(&self, id: i64) -> Result<Option<UserRecord>>;

    async fn find_user_by_token_hash(&self, token_sha256: &str) -> Result<Option<UserRecord>>;

    /// Returns `NotFound` for an unknown user.
    async fn set_subscription(&self, id: i64, active: bool) -> Result<UserRecord>;
}
