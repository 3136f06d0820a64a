use cg_domain::error::{Error, Result};
use cg_domain::{Message, Role};

/// Check `input_text` is present and within `max_chars` characters.
///
/// Returns the text with surrounding whitespace removed.
pub fn validate_input(input: Option<&str>, max_chars: usize) -> Result<&str> {
    let text = input.map(str::trim).unwrap_or_default();
    if text.is_empty() {
        return Err(Error::Validation("input_text is required".into()));
    }
    if text.chars().count() > max_chars {
        return Err(Error::Validation(format!(
            "input_text may not be greater than {max_chars} characters"
        )));
    }
    Ok(text)
}

/// Check a caller-supplied guest history.
///
/// It must alternate user/assistant starting with user, end on an
/// assistant reply, contain no system messages, and hold at most
/// `max_messages` entries.
pub fn validate_history(history: &[Message], max_messages: usize) -> Result<()> {
    if history.len() > max_messages {
        return Err(Error::Validation(format!(
            "message_history may not contain more than {max_messages} messages"
        )));
    }
    for (i, message) in history.iter().enumerate() {
        let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
        if message.role != expected {
            return Err(Error::Validation(format!(
                "message_history[{i}].role must be {}",
                expected.as_str()
            )));
        }
        if message.content.trim().is_empty() {
            return Err(Error::Validation(format!(
                "message_history[{i}].content is required"
            )));
        }
    }
    if history.len() % 2 == 1 {
        return Err(Error::Validation(
            "message_history must end with an assistant message".into(),
        ));
    }
    Ok(())
}

/// Parse a conversation id path segment: a positive integer.
pub fn parse_conversation_id(raw: &str) -> Result<i64> {
    match raw.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(Error::Validation(
            "conversation id must be a positive integer".into(),
        )),
    }
}
