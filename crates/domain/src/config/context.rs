use serde::{Deserialize, Serialize};

/// Caps applied when validating input and assembling completion context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Most recent turns replayed from a stored conversation.
    #[serde(default = "d_10")]
    pub max_turns: usize,
    /// Longest accepted `input_text`, in characters.
    #[serde(default = "d_2000")]
    pub max_input_chars: usize,
    /// Characters kept from the first input when naming a conversation.
    #[serde(default = "d_20")]
    pub name_max_chars: usize,
    /// Longest caller-supplied history accepted from guests.
    #[serde(default = "d_20")]
    pub max_history_messages: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_turns: 10,
            max_input_chars: 2000,
            name_max_chars: 20,
            max_history_messages: 20,
        }
    }
}

fn d_10() -> usize {
    10
}
fn d_2000() -> usize {
    2000
}
fn d_20() -> usize {
    20
}
