//! Process-local store backed by `parking_lot` maps.
//!
//! Used by tests and by `storage.backend = "memory"`.  Every trait method
//! takes the relevant lock once, so each call is atomic with respect to
//! other callers of the same store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;

use cg_domain::error::{Error, Result};
use cg_domain::identity::{IdentityKind, SubjectKey};
use cg_domain::records::{
    ConversationRecord, ConversationTurn, GuestRecord, UsagePeriodRecord, UserRecord,
};

use crate::traits::{ConversationStore, GuestStore, TurnWrite, UsageStore, UserStore};

#[derive(Default)]
struct ConversationTables {
    next_conversation_id: i64,
    next_turn_id: i64,
    conversations: HashMap<i64, ConversationRecord>,
    turns: HashMap<i64, Vec<ConversationTurn>>,
}

#[derive(Default)]
struct UserTable {
    next_id: i64,
    users: HashMap<i64, UserRecord>,
}

/// In-memory implementation of every store trait.
#[derive(Default)]
pub struct MemoryStore {
    usage: RwLock<HashMap<(SubjectKey, NaiveDate), UsagePeriodRecord>>,
    conversations: RwLock<ConversationTables>,
    guests: RwLock<HashMap<(IdentityKind, String), GuestRecord>>,
    users: RwLock<UserTable>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

// ── usage ──────────────────────────────────────────────────────────

#[async_trait]
impl UsageStore for MemoryStore {
    async fn get_usage(
        &self,
        subject: &SubjectKey,
        period_date: NaiveDate,
    ) -> Result<Option<UsagePeriodRecord>> {
        Ok(self
            .usage
            .read()
            .get(&(subject.clone(), period_date))
            .cloned())
    }

    async fn open_usage(&self, record: UsagePeriodRecord) -> Result<UsagePeriodRecord> {
        let mut usage = self.usage.write();
        let key = (record.subject_key.clone(), record.period_date);
        Ok(usage.entry(key).or_insert(record).clone())
    }

    async fn commit_usage(
        &self,
        record: &UsagePeriodRecord,
        expected_last_used_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut usage = self.usage.write();
        let key = (record.subject_key.clone(), record.period_date);
        match usage.get_mut(&key) {
            Some(stored) if stored.last_used_at == expected_last_used_at => {
                stored.last_used_at = record.last_used_at;
                stored.usage_minutes = record.usage_minutes;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

// ── conversations ──────────────────────────────────────────────────

fn chronological(turns: &mut [ConversationTurn]) {
    turns.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn get_conversation(
        &self,
        subject: &SubjectKey,
        id: i64,
    ) -> Result<Option<ConversationRecord>> {
        Ok(self
            .conversations
            .read()
            .conversations
            .get(&id)
            .filter(|c| &c.subject_key == subject)
            .cloned())
    }

    async fn list_conversations(&self, subject: &SubjectKey) -> Result<Vec<ConversationRecord>> {
        let tables = self.conversations.read();
        let mut list: Vec<ConversationRecord> = tables
            .conversations
            .values()
            .filter(|c| &c.subject_key == subject)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        Ok(list)
    }

    async fn recent_turns(
        &self,
        conversation_id: i64,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>> {
        let mut turns = self.turns(conversation_id).await?;
        let skip = turns.len().saturating_sub(limit);
        Ok(turns.split_off(skip))
    }

    async fn turns(&self, conversation_id: i64) -> Result<Vec<ConversationTurn>> {
        let mut turns = self
            .conversations
            .read()
            .turns
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default();
        chronological(&mut turns);
        Ok(turns)
    }

    async fn persist_turn(
        &self,
        write: TurnWrite<'_>,
    ) -> Result<(ConversationRecord, ConversationTurn)> {
        let mut tables = self.conversations.write();

        let conversation_id = match write.conversation_id {
            Some(id) => {
                let owned = tables
                    .conversations
                    .get(&id)
                    .is_some_and(|c| &c.subject_key == write.subject);
                if !owned {
                    return Err(Error::NotFound);
                }
                id
            }
            None => {
                tables.next_conversation_id += 1;
                let id = tables.next_conversation_id;
                tables.conversations.insert(
                    id,
                    ConversationRecord {
                        id,
                        subject_key: write.subject.clone(),
                        name: Some(write.name.to_owned()),
                        created_at: write.now,
                        updated_at: write.now,
                        ended_at: None,
                    },
                );
                id
            }
        };

        tables.next_turn_id += 1;
        let turn = ConversationTurn {
            id: tables.next_turn_id,
            conversation_id,
            input_text: write.input_text.to_owned(),
            output_text: write.output_text.map(ToOwned::to_owned),
            created_at: write.now,
        };
        tables
            .turns
            .entry(conversation_id)
            .or_default()
            .push(turn.clone());

        let conversation = tables
            .conversations
            .get_mut(&conversation_id)
            .ok_or(Error::NotFound)?;
        conversation.updated_at = write.now;
        Ok((conversation.clone(), turn))
    }
}

// ── guests ─────────────────────────────────────────────────────────

#[async_trait]
impl GuestStore for MemoryStore {
    async fn find_or_create_guest(
        &self,
        kind: IdentityKind,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<(GuestRecord, bool)> {
        let mut guests = self.guests.write();
        let key = (kind, identifier.to_owned());
        if let Some(existing) = guests.get(&key) {
            return Ok((existing.clone(), false));
        }
        let record = GuestRecord {
            kind,
            identifier: identifier.to_owned(),
            created_at: now,
        };
        guests.insert(key, record.clone());
        Ok((record, true))
    }
}

// ── users ──────────────────────────────────────────────────────────

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(
        &self,
        name: &str,
        token_sha256: &str,
        now: DateTime<Utc>,
    ) -> Result<UserRecord> {
        let mut table = self.users.write();
        if table.users.values().any(|u| u.token_sha256 == token_sha256) {
            return Err(Error::Storage("token hash already registered".into()));
        }
        table.next_id += 1;
        let user = UserRecord {
            id: table.next_id,
            name: name.to_owned(),
            subscription_active: false,
            token_sha256: token_sha256.to_owned(),
            created_at: now,
        };
        table.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: i64) -> Result<Option<UserRecord>> {
        Ok(self.users.read().users.get(&id).cloned())
    }

    async fn find_user_by_token_hash(&self, token_sha256: &str) -> Result<Option<UserRecord>> {
        Ok(self
            .users
            .read()
            .users
            .values()
            .find(|u| u.token_sha256 == token_sha256)
            .cloned())
    }

    async fn set_subscription(&self, id: i64, active: bool) -> Result<UserRecord> {
        let mut table = self.users.write();
        let user = table.users.get_mut(&id).ok_or(Error::NotFound)?;
        user.subscription_active = active;
        Ok(user.clone())
    }
}
