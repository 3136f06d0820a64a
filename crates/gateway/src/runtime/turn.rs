//! The conversation turn pipeline.
//!
//! Order of operations:
//! gateway pre-flight → validate input → resolve identity → reserve quota →
//! build context → complete → persist conversation + turn → commit usage.
//!
//! A rejection at any step before persistence leaves no stored trace of the
//! request, and usage is committed only after the turn is stored.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use cg_conversations::validation::validate_input;
use cg_conversations::{conversation_name, Credentials};
use cg_domain::error::{Error, Result};
use cg_domain::records::{ConversationRecord, ConversationTurn, UsagePeriodRecord};
use cg_domain::trace::TraceEvent;
use cg_domain::{Identity, Message, SubjectKey};
use cg_providers::CompletionGateway;
use cg_storage::TurnWrite;

use crate::state::AppState;

/// One inbound turn, already decoded from the request body.
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    pub input_text: Option<String>,
    pub conversation_id: Option<i64>,
    /// Client-held history, honored for guests starting a new conversation.
    pub message_history: Vec<Message>,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub identity: Identity,
    pub conversation: ConversationRecord,
    pub turn: ConversationTurn,
    /// Whether this turn opened the conversation.
    pub created: bool,
    /// The committed usage record; `None` for unlimited subjects or when the
    /// commit failed after the turn was stored.
    pub usage: Option<UsagePeriodRecord>,
}

/// The configured completion gateway, or `GatewayMisconfigured` when the
/// upstream credential is missing.  Checked before any other work.
pub fn completion_gateway(state: &AppState) -> Result<&Arc<dyn CompletionGateway>> {
    state.gateway.as_ref().ok_or_else(|| {
        Error::GatewayMisconfigured(format!(
            "no completion credential in {}",
            state.config.llm.api_key_env
        ))
    })
}

/// Run one conversation turn end to end.  Any failure is logged with the
/// subject (once resolved) and the requested conversation.
pub async fn store_conversation(
    state: &AppState,
    credentials: Credentials<'_>,
    request: &TurnRequest,
    now: DateTime<Utc>,
) -> Result<TurnOutcome> {
    let mut subject = None;
    let result = run_turn(state, credentials, request, now, &mut subject).await;
    if let Err(e) = &result {
        e.log(subject.as_ref().map(SubjectKey::as_str), request.conversation_id);
    }
    result
}

async fn run_turn(
    state: &AppState,
    credentials: Credentials<'_>,
    request: &TurnRequest,
    now: DateTime<Utc>,
    resolved: &mut Option<SubjectKey>,
) -> Result<TurnOutcome> {
    let gateway = completion_gateway(state)?;

    let input = validate_input(
        request.input_text.as_deref(),
        state.config.context.max_input_chars,
    )?;
    let identity = state.resolver.resolve(credentials, now).await?;
    let subject = identity.subject_key();
    *resolved = Some(subject.clone());

    let reservation = state.ledger.check_and_reserve(&identity, now).await?;

    let built = state
        .context
        .build(
            &identity,
            request.conversation_id,
            &request.message_history,
            input,
        )
        .await?;

    let reply = gateway
        .complete(&built.messages, state.config.llm.max_tokens)
        .await?;

    let name = conversation_name(input, state.config.context.name_max_chars);
    let existing = built.conversation.as_ref().map(|c| c.id);
    let (conversation, turn) = state
        .stores
        .conversations
        .persist_turn(TurnWrite {
            subject: &subject,
            conversation_id: existing,
            name: &name,
            input_text: input,
            output_text: Some(&reply),
            now,
        })
        .await?;

    let created = existing.is_none();
    if created {
        TraceEvent::ConversationCreated {
            subject_key: subject.to_string(),
            conversation_id: conversation.id,
        }
        .emit();
    }
    TraceEvent::TurnPersisted {
        conversation_id: conversation.id,
        turn_id: turn.id,
    }
    .emit();

    let usage = match state.ledger.commit(reservation, now).await {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!(
                subject_key = %subject,
                conversation_id = conversation.id,
                error = %e,
                "usage commit failed after a stored turn"
            );
            None
        }
    };

    Ok(TurnOutcome {
        identity,
        conversation,
        turn,
        created,
        usage,
    })
}
