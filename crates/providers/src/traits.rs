use cg_domain::error::Result;
use cg_domain::Message;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core gateway trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Upstream text completion.
///
/// One call is one attempt: implementations do not retry, and any failure
/// surfaces as `GatewayFailure`.
#[async_trait::async_trait]
pub trait CompletionGateway: Send + Sync {
    /// Send the assembled context and return the assistant's reply text.
    async fn complete(&self, messages: &[Message], max_tokens: u32) -> Result<String>;

    /// Model identifier, for logging.
    fn model(&self) -> &str;
}
