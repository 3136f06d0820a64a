//! Assemble the message list sent to the completion gateway.
//!
//! Layout: system instruction, then either the newest stored turns of the
//! conversation (oldest first) or, for guests starting fresh, their
//! validated client-side history, then the current input.

use std::sync::Arc;

use cg_domain::config::{ContextConfig, LlmConfig};
use cg_domain::error::{Error, Result};
use cg_domain::records::{ConversationDetail, ConversationRecord};
use cg_domain::trace::TraceEvent;
use cg_domain::{Identity, Message, SubjectKey};
use cg_storage::ConversationStore;

use crate::validation::validate_history;

/// What the builder produced for one request.
#[derive(Debug, Clone)]
pub struct BuiltContext {
    pub messages: Vec<Message>,
    /// The stored conversation the context was read from, if any.
    pub conversation: Option<ConversationRecord>,
    pub turns_included: usize,
    pub history_messages: usize,
}

pub struct ContextBuilder {
    conversations: Arc<dyn ConversationStore>,
    system_prompt: String,
    max_turns: usize,
    max_history_messages: usize,
}

impl ContextBuilder {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        llm: &LlmConfig,
        context: &ContextConfig,
    ) -> Self {
        Self {
            conversations,
            system_prompt: llm.system_prompt.clone(),
            max_turns: context.max_turns,
            max_history_messages: context.max_history_messages,
        }
    }

    /// Build the context for `input`.
    ///
    /// `history` is honored only for guests without a `conversation_id`.
    /// A conversation the identity does not own is `NotFound`.
    pub async fn build(
        &self,
        identity: &Identity,
        conversation_id: Option<i64>,
        history: &[Message],
        input: &str,
    ) -> Result<BuiltContext> {
        let subject = identity.subject_key();
        let mut messages = vec![Message::system(self.system_prompt.clone())];
        let mut turns_included = 0;
        let mut history_messages = 0;

        let conversation = match conversation_id {
            Some(id) => {
                let conversation = self
                    .conversations
                    .get_conversation(&subject, id)
                    .await?
                    .ok_or(Error::NotFound)?;
                let turns = self.conversations.recent_turns(id, self.max_turns).await?;
                turns_included = turns.len();
                for turn in turns {
                    messages.push(Message::user(turn.input_text));
                    messages.push(Message::assistant(turn.output_text.unwrap_or_default()));
                }
                Some(conversation)
            }
            None => {
                if identity.is_guest() && !history.is_empty() {
                    validate_history(history, self.max_history_messages)?;
                    history_messages = history.len();
                    messages.extend(history.iter().cloned());
                }
                None
            }
        };

        messages.push(Message::user(input));

        TraceEvent::ContextBuilt {
            subject_key: subject.to_string(),
            conversation_id,
            turns_included,
            history_messages,
        }
        .emit();

        Ok(BuiltContext {
            messages,
            conversation,
            turns_included,
            history_messages,
        })
    }
}

/// A conversation owned by `subject` with all of its turns.
pub async fn conversation_detail(
    store: &dyn ConversationStore,
    subject: &SubjectKey,
    id: i64,
) -> Result<ConversationDetail> {
    let conversation = store
        .get_conversation(subject, id)
        .await?
        .ok_or(Error::NotFound)?;
    let turns = store.turns(id).await?;
    Ok(ConversationDetail {
        conversation,
        turns,
    })
}
