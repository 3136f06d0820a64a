use serde::Serialize;

/// Structured trace events emitted across all ChatGate crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    IdentityResolved {
        subject_key: String,
        kind: &'static str,
    },
    GuestRegistered {
        subject_key: String,
    },
    UsageChecked {
        subject_key: String,
        period_date: String,
        used_minutes: i64,
        limit_minutes: Option<i64>,
        allowed: bool,
    },
    UsageCommitted {
        subject_key: String,
        period_date: String,
        usage_minutes: i64,
    },
    ContextBuilt {
        subject_key: String,
        conversation_id: Option<i64>,
        turns_included: usize,
        history_messages: usize,
    },
    CompletionRequest {
        model: String,
        messages: usize,
        duration_ms: u64,
        ok: bool,
    },
    ConversationCreated {
        subject_key: String,
        conversation_id: i64,
    },
    TurnPersisted {
        conversation_id: i64,
        turn_id: i64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "cg_event");
    }
}
