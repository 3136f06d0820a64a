use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Completion gateway
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Upstream OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL; `/chat/completions` is appended.
    #[serde(default = "d_base_url")]
    pub base_url: String,
    #[serde(default = "d_model")]
    pub model: String,
    /// Environment variable holding the bearer credential.  The key itself
    /// never lives in the config file.
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "d_300")]
    pub max_tokens: u32,
    /// Single-attempt timeout for one completion call.
    #[serde(default = "d_30000")]
    pub timeout_ms: u64,
    /// Instruction prepended to every assembled context.
    #[serde(default = "d_system_prompt")]
    pub system_prompt: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: d_base_url(),
            model: d_model(),
            api_key_env: d_api_key_env(),
            max_tokens: 300,
            timeout_ms: 30_000,
            system_prompt: d_system_prompt(),
        }
    }
}

fn d_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn d_model() -> String {
    "gpt-3.5-turbo".into()
}
fn d_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn d_300() -> u32 {
    300
}
fn d_30000() -> u64 {
    30_000
}
fn d_system_prompt() -> String {
    "You are a helpful assistant.".into()
}
