//! Conversation endpoints.
//!
//! - `GET  /v1/conversations`      list the caller's conversations
//! - `POST /v1/conversations`      run one turn (create or continue)
//! - `GET  /v1/conversations/:id`  one conversation with all of its turns

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, Path, State};
use axum::response::Response;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use cg_conversations::validation::parse_conversation_id;
use cg_conversations::{conversation_detail, display_name};
use cg_domain::records::{ConversationRecord, ConversationTurn};
use cg_domain::{Error, Message, Result};

use crate::api::auth::RequestCredentials;
use crate::api::error::{ok, rejected, ApiResult};
use crate::runtime::{self, TurnRequest};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Serialize)]
struct ConversationSummary<'a> {
    conversation_id: i64,
    conversation_name: &'a str,
    /// `None` for guest-owned conversations.
    user_id: Option<i64>,
    created_at: String,
    updated_at: String,
}

impl<'a> From<&'a ConversationRecord> for ConversationSummary<'a> {
    fn from(c: &'a ConversationRecord) -> Self {
        Self {
            conversation_id: c.id,
            conversation_name: display_name(c.name.as_deref()),
            user_id: c.subject_key.user_id(),
            created_at: c.created_at.to_rfc3339(),
            updated_at: c.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
struct TurnView<'a> {
    id: i64,
    input_text: &'a str,
    output_text: Option<&'a str>,
    created_at: String,
}

impl<'a> From<&'a ConversationTurn> for TurnView<'a> {
    fn from(t: &'a ConversationTurn) -> Self {
        Self {
            id: t.id,
            input_text: &t.input_text,
            output_text: t.output_text.as_deref(),
            created_at: t.created_at.to_rfc3339(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/conversations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list_conversations(
    State(state): State<AppState>,
    credentials: RequestCredentials,
) -> ApiResult<Response> {
    let identity = credentials.resolve(&state, chrono::Utc::now()).await?;
    let subject = identity.subject_key();
    let conversations = state
        .stores
        .conversations
        .list_conversations(&subject)
        .await
        .map_err(|e| rejected(e, Some(&subject), None))?;

    let data: Vec<ConversationSummary<'_>> = conversations.iter().map(Into::into).collect();
    Ok(ok("Conversations retrieved successfully", data))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/conversations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Default, Deserialize)]
pub struct StoreConversationBody {
    #[serde(default)]
    pub input_text: Option<String>,
    /// Accepted as a JSON number or a numeric string.
    #[serde(default)]
    pub conversation_id: Option<Value>,
    #[serde(default)]
    pub message_history: Option<Vec<Message>>,
}

/// Decode the optional conversation id.  Absent, `null` and `""` all mean
/// "start a new conversation".
fn body_conversation_id(raw: Option<&Value>) -> Result<Option<i64>> {
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => parse_conversation_id(s).map(Some),
        Some(Value::Number(n)) => n
            .as_i64()
            .filter(|id| *id > 0)
            .map(Some)
            .ok_or_else(|| Error::Validation("invalid conversation ID".into())),
        Some(_) => Err(Error::Validation("invalid conversation ID".into())),
    }
}

/// Run one turn.  The credential pre-flight comes before the body is even
/// looked at.  The pipeline runs on its own task so a client disconnect
/// cannot cancel the upstream call or split a stored turn from its usage
/// commit.
pub async fn store_conversation(
    State(state): State<AppState>,
    credentials: RequestCredentials,
    body: std::result::Result<Json<StoreConversationBody>, JsonRejection>,
) -> ApiResult<Response> {
    runtime::completion_gateway(&state).map_err(|e| rejected(e, None, None))?;

    let Json(body) = body.map_err(|e| rejected(Error::Validation(e.body_text()), None, None))?;
    let conversation_id =
        body_conversation_id(body.conversation_id.as_ref()).map_err(|e| rejected(e, None, None))?;

    let request = TurnRequest {
        conversation_id,
        input_text: body.input_text,
        message_history: body.message_history.unwrap_or_default(),
    };

    let turn = tokio::spawn(async move {
        runtime::store_conversation(
            &state,
            credentials.as_credentials(),
            &request,
            chrono::Utc::now(),
        )
        .await
    });
    let outcome = turn
        .await
        .map_err(|e| rejected(Error::Storage(format!("turn task: {e}")), None, conversation_id))??;

    let conversation = &outcome.conversation;
    let message = if outcome.created {
        "Conversation created successfully"
    } else {
        "Conversation updated successfully"
    };
    Ok(ok(
        message,
        serde_json::json!({
            "conversation_id": conversation.id,
            "conversation_name": display_name(conversation.name.as_deref()),
            "user_id": conversation.subject_key.user_id(),
            "input_text": outcome.turn.input_text,
            "output_text": outcome.turn.output_text,
            "created_at": outcome.turn.created_at.to_rfc3339(),
            "updated_at": conversation.updated_at.to_rfc3339(),
        }),
    ))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/conversations/:id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn get_conversation(
    State(state): State<AppState>,
    credentials: RequestCredentials,
    Path(raw_id): Path<String>,
) -> ApiResult<Response> {
    let identity = credentials.resolve(&state, chrono::Utc::now()).await?;
    let subject = identity.subject_key();
    let id = parse_conversation_id(&raw_id).map_err(|e| rejected(e, Some(&subject), None))?;

    let detail = conversation_detail(state.stores.conversations.as_ref(), &subject, id)
        .await
        .map_err(|e| rejected(e, Some(&subject), Some(id)))?;
    let conversation = &detail.conversation;
    let turns: Vec<TurnView<'_>> = detail.turns.iter().map(Into::into).collect();

    Ok(ok(
        "Conversation details retrieved successfully",
        serde_json::json!({
            "id": conversation.id,
            "user_id": conversation.subject_key.user_id(),
            "name": display_name(conversation.name.as_deref()),
            "created_at": conversation.created_at.to_rfc3339(),
            "updated_at": conversation.updated_at.to_rfc3339(),
            "conversation_data": turns,
        }),
    ))
}
