//! SQLite-backed store (sqlx).
//!
//! The schema is created in code on [`SqliteStore::connect`].  Timestamps
//! are stored through sqlx's chrono encoding; period dates as `YYYY-MM-DD`.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use cg_domain::error::{Error, Result};
use cg_domain::identity::{IdentityKind, SubjectKey};
use cg_domain::records::{
    ConversationRecord, ConversationTurn, GuestRecord, UsagePeriodRecord, UserRecord,
};

use crate::traits::{ConversationStore, GuestStore, TurnWrite, UsageStore, UserStore};

const SCHEMA: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS usage_period_records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        subject_key TEXT NOT NULL,
        period_date TEXT NOT NULL,
        first_used_at TEXT NOT NULL,
        last_used_at TEXT NOT NULL,
        usage_minutes INTEGER NOT NULL DEFAULT 0,
        is_guest INTEGER NOT NULL DEFAULT 0,
        UNIQUE (subject_key, period_date)
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS conversations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        subject_key TEXT NOT NULL,
        name TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        ended_at TEXT
    )
    ",
    r"CREATE INDEX IF NOT EXISTS idx_conversations_subject ON conversations (subject_key, updated_at)",
    r"
    CREATE TABLE IF NOT EXISTS conversation_turns (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        conversation_id INTEGER NOT NULL REFERENCES conversations (id) ON DELETE CASCADE,
        input_text TEXT NOT NULL,
        output_text TEXT,
        created_at TEXT NOT NULL
    )
    ",
    r"CREATE INDEX IF NOT EXISTS idx_turns_conversation ON conversation_turns (conversation_id, created_at, id)",
    r"
    CREATE TABLE IF NOT EXISTS guests (
        kind TEXT NOT NULL,
        identifier TEXT NOT NULL,
        created_at TEXT NOT NULL,
        PRIMARY KEY (kind, identifier)
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        subscription_active INTEGER NOT NULL DEFAULT 0,
        token_sha256 TEXT NOT NULL UNIQUE,
        created_at TEXT NOT NULL
    )
    ",
];

fn db_err(context: &str) -> impl Fn(sqlx::Error) -> Error + '_ {
    move |e| Error::Storage(format!("{context}: {e}"))
}

/// Store implementation over a shared `SqlitePool`.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `url` and apply the schema.
    ///
    /// In-memory URLs (`sqlite::memory:`) need `max_connections = 1`, since
    /// each connection would otherwise see its own empty database.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(db_err("invalid database url"))?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(db_err("failed to open database"))?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Wrap an existing pool.  The schema is not applied.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(db_err("failed to apply schema"))?;
        }
        tracing::debug!(tables = SCHEMA.len(), "sqlite schema applied");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

// ── row mapping ────────────────────────────────────────────────────

fn usage_from_row(r: &SqliteRow) -> UsagePeriodRecord {
    UsagePeriodRecord {
        subject_key: SubjectKey::from_stored(r.get::<String, _>("subject_key")),
        period_date: r.get("period_date"),
        first_used_at: r.get("first_used_at"),
        last_used_at: r.get("last_used_at"),
        usage_minutes: r.get("usage_minutes"),
        is_guest: r.get("is_guest"),
    }
}

fn conversation_from_row(r: &SqliteRow) -> ConversationRecord {
    ConversationRecord {
        id: r.get("id"),
        subject_key: SubjectKey::from_stored(r.get::<String, _>("subject_key")),
        name: r.get("name"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
        ended_at: r.get("ended_at"),
    }
}

fn turn_from_row(r: &SqliteRow) -> ConversationTurn {
    ConversationTurn {
        id: r.get("id"),
        conversation_id: r.get("conversation_id"),
        input_text: r.get("input_text"),
        output_text: r.get("output_text"),
        created_at: r.get("created_at"),
    }
}

fn user_from_row(r: &SqliteRow) -> UserRecord {
    UserRecord {
        id: r.get("id"),
        name: r.get("name"),
        subscription_active: r.get("subscription_active"),
        token_sha256: r.get("token_sha256"),
        created_at: r.get("created_at"),
    }
}

// ── usage ──────────────────────────────────────────────────────────

#[async_trait]
impl UsageStore for SqliteStore {
    async fn get_usage(
        &self,
        subject: &SubjectKey,
        period_date: NaiveDate,
    ) -> Result<Option<UsagePeriodRecord>> {
        let row = sqlx::query(
            r"
            SELECT subject_key, period_date, first_used_at, last_used_at, usage_minutes, is_guest
            FROM usage_period_records
            WHERE subject_key = $1 AND period_date = $2
            ",
        )
        .bind(subject.as_str())
        .bind(period_date)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("failed to read usage record"))?;
        Ok(row.as_ref().map(usage_from_row))
    }

    async fn open_usage(&self, record: UsagePeriodRecord) -> Result<UsagePeriodRecord> {
        sqlx::query(
            r"
            INSERT INTO usage_period_records
                (subject_key, period_date, first_used_at, last_used_at, usage_minutes, is_guest)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (subject_key, period_date) DO NOTHING
            ",
        )
        .bind(record.subject_key.as_str())
        .bind(record.period_date)
        .bind(record.first_used_at)
        .bind(record.last_used_at)
        .bind(record.usage_minutes)
        .bind(record.is_guest)
        .execute(&self.pool)
        .await
        .map_err(db_err("failed to open usage record"))?;

        self.get_usage(&record.subject_key, record.period_date)
            .await?
            .ok_or_else(|| Error::Storage("usage record vanished after insert".into()))
    }

    async fn commit_usage(
        &self,
        record: &UsagePeriodRecord,
        expected_last_used_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_err("failed to begin usage commit"))?;

        let current: Option<DateTime<Utc>> = sqlx::query(
            r"
            SELECT last_used_at FROM usage_period_records
            WHERE subject_key = $1 AND period_date = $2
            ",
        )
        .bind(record.subject_key.as_str())
        .bind(record.period_date)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err("failed to read usage record"))?
        .map(|r| r.get("last_used_at"));

        if current != Some(expected_last_used_at) {
            tx.rollback()
                .await
                .map_err(db_err("failed to roll back usage commit"))?;
            return Ok(false);
        }

        sqlx::query(
            r"
            UPDATE usage_period_records
            SET last_used_at = $1, usage_minutes = $2
            WHERE subject_key = $3 AND period_date = $4
            ",
        )
        .bind(record.last_used_at)
        .bind(record.usage_minutes)
        .bind(record.subject_key.as_str())
        .bind(record.period_date)
        .execute(&mut *tx)
        .await
        .map_err(db_err("failed to update usage record"))?;

        tx.commit()
            .await
            .map_err(db_err("failed to commit usage record"))?;
        Ok(true)
    }
}

// ── conversations ──────────────────────────────────────────────────

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn get_conversation(
        &self,
        subject: &SubjectKey,
        id: i64,
    ) -> Result<Option<ConversationRecord>> {
        let row = sqlx::query(
            r"
            SELECT id, subject_key, name, created_at, updated_at, ended_at
            FROM conversations
            WHERE id = $1 AND subject_key = $2
            ",
        )
        .bind(id)
        .bind(subject.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("failed to get conversation"))?;
        Ok(row.as_ref().map(conversation_from_row))
    }

    async fn list_conversations(&self, subject: &SubjectKey) -> Result<Vec<ConversationRecord>> {
        let rows = sqlx::query(
            r"
            SELECT id, subject_key, name, created_at, updated_at, ended_at
            FROM conversations
            WHERE subject_key = $1
            ORDER BY updated_at DESC, id DESC
            ",
        )
        .bind(subject.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("failed to list conversations"))?;
        Ok(rows.iter().map(conversation_from_row).collect())
    }

    async fn recent_turns(
        &self,
        conversation_id: i64,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>> {
        let rows = sqlx::query(
            r"
            SELECT id, conversation_id, input_text, output_text, created_at
            FROM conversation_turns
            WHERE conversation_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            ",
        )
        .bind(conversation_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("failed to get recent turns"))?;

        let mut turns: Vec<ConversationTurn> = rows.iter().map(turn_from_row).collect();
        turns.reverse();
        Ok(turns)
    }

    async fn turns(&self, conversation_id: i64) -> Result<Vec<ConversationTurn>> {
        let rows = sqlx::query(
            r"
            SELECT id, conversation_id, input_text, output_text, created_at
            FROM conversation_turns
            WHERE conversation_id = $1
            ORDER BY created_at ASC, id ASC
            ",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("failed to get turns"))?;
        Ok(rows.iter().map(turn_from_row).collect())
    }

    async fn persist_turn(
        &self,
        write: TurnWrite<'_>,
    ) -> Result<(ConversationRecord, ConversationTurn)> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_err("failed to begin turn write"))?;

        let conversation_id = match write.conversation_id {
            Some(id) => {
                let updated = sqlx::query(
                    r"
                    UPDATE conversations SET updated_at = $1
                    WHERE id = $2 AND subject_key = $3
                    ",
                )
                .bind(write.now)
                .bind(id)
                .bind(write.subject.as_str())
                .execute(&mut *tx)
                .await
                .map_err(db_err("failed to touch conversation"))?;
                if updated.rows_affected() == 0 {
                    return Err(Error::NotFound);
                }
                id
            }
            None => sqlx::query(
                r"
                INSERT INTO conversations (subject_key, name, created_at, updated_at)
                VALUES ($1, $2, $3, $3)
                ",
            )
            .bind(write.subject.as_str())
            .bind(write.name)
            .bind(write.now)
            .execute(&mut *tx)
            .await
            .map_err(db_err("failed to create conversation"))?
            .last_insert_rowid(),
        };

        let turn_id = sqlx::query(
            r"
            INSERT INTO conversation_turns (conversation_id, input_text, output_text, created_at)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(conversation_id)
        .bind(write.input_text)
        .bind(write.output_text)
        .bind(write.now)
        .execute(&mut *tx)
        .await
        .map_err(db_err("failed to append turn"))?
        .last_insert_rowid();

        let conversation = sqlx::query(
            r"
            SELECT id, subject_key, name, created_at, updated_at, ended_at
            FROM conversations WHERE id = $1
            ",
        )
        .bind(conversation_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err("failed to reload conversation"))?;
        let conversation = conversation_from_row(&conversation);

        tx.commit()
            .await
            .map_err(db_err("failed to commit turn"))?;

        let turn = ConversationTurn {
            id: turn_id,
            conversation_id,
            input_text: write.input_text.to_owned(),
            output_text: write.output_text.map(ToOwned::to_owned),
            created_at: write.now,
        };
        Ok((conversation, turn))
    }
}

// ── guests ─────────────────────────────────────────────────────────

#[async_trait]
impl GuestStore for SqliteStore {
    async fn find_or_create_guest(
        &self,
        kind: IdentityKind,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<(GuestRecord, bool)> {
        let inserted = sqlx::query(
            r"
            INSERT INTO guests (kind, identifier, created_at) VALUES ($1, $2, $3)
            ON CONFLICT (kind, identifier) DO NOTHING
            ",
        )
        .bind(kind.as_str())
        .bind(identifier)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err("failed to insert guest"))?
        .rows_affected()
            > 0;

        let row = sqlx::query(
            r"SELECT kind, identifier, created_at FROM guests WHERE kind = $1 AND identifier = $2",
        )
        .bind(kind.as_str())
        .bind(identifier)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err("failed to load guest"))?;

        let stored_kind: String = row.get("kind");
        let record = GuestRecord {
            kind: IdentityKind::from_tag(&stored_kind)
                .ok_or_else(|| Error::Storage(format!("unknown guest kind '{stored_kind}'")))?,
            identifier: row.get("identifier"),
            created_at: row.get("created_at"),
        };
        Ok((record, inserted))
    }
}

// ── users ──────────────────────────────────────────────────────────

#[async_trait]
impl UserStore for SqliteStore {
    async fn create_user(
        &self,
        name: &str,
        token_sha256: &str,
        now: DateTime<Utc>,
    ) -> Result<UserRecord> {
        let id = sqlx::query(
            r"INSERT INTO users (name, subscription_active, token_sha256, created_at) VALUES ($1, 0, $2, $3)",
        )
        .bind(name)
        .bind(token_sha256)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err("failed to create user"))?
        .last_insert_rowid();

        Ok(UserRecord {
            id,
            name: name.to_owned(),
            subscription_active: false,
            token_sha256: token_sha256.to_owned(),
            created_at: now,
        })
    }

    async fn get_user(&self, id: i64) -> Result<Option<UserRecord>> {
        let row = sqlx::query(
            r"SELECT id, name, subscription_active, token_sha256, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("failed to get user"))?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn find_user_by_token_hash(&self, token_sha256: &str) -> Result<Option<UserRecord>> {
        let row = sqlx::query(
            r"SELECT id, name, subscription_active, token_sha256, created_at FROM users WHERE token_sha256 = $1",
        )
        .bind(token_sha256)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("failed to look up user"))?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn set_subscription(&self, id: i64, active: bool) -> Result<UserRecord> {
        let updated = sqlx::query(r"UPDATE users SET subscription_active = $1 WHERE id = $2")
            .bind(active)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err("failed to update subscription"))?;
        if updated.rows_affected() == 0 {
            return Err(Error::NotFound);
        }
        self.get_user(id).await?.ok_or(Error::NotFound)
    }
}
