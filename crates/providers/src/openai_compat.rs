//! OpenAI-compatible chat completions adapter.
//!
//! Works with OpenAI and any endpoint that follows the `/chat/completions`
//! contract (Ollama, vLLM, LM Studio, Together, ...).

use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;

use cg_domain::config::LlmConfig;
use cg_domain::error::{Error, Result};
use cg_domain::trace::TraceEvent;
use cg_domain::Message;

use crate::traits::CompletionGateway;
use crate::util::{from_reqwest, resolve_api_key};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct OpenAiCompatGateway {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiCompatGateway {
    /// Build from config, reading the key from `llm.api_key_env`.
    ///
    /// Fails with `GatewayMisconfigured` when the key is absent.
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        let api_key = resolve_api_key(&cfg.api_key_env)?;
        Self::new(
            &cfg.base_url,
            api_key,
            &cfg.model,
            Duration::from_millis(cfg.timeout_ms),
        )
    }

    pub fn new(base_url: &str, api_key: String, model: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::GatewayMisconfigured(format!("http client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            client,
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire format
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
}

/// Pull the first choice's message content out of a response body.
///
/// A response without usable text counts as a failure.
fn parse_chat_response(body: &Value) -> Result<String> {
    let choice = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .ok_or_else(|| Error::GatewayFailure("no choices in response".into()))?;

    let content = choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|v| v.as_str())
        .map(str::trim)
        .unwrap_or_default();

    if content.is_empty() {
        return Err(Error::GatewayFailure("empty completion content".into()));
    }
    Ok(content.to_string())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl CompletionGateway for OpenAiCompatGateway {
    async fn complete(&self, messages: &[Message], max_tokens: u32) -> Result<String> {
        let url = self.chat_url();
        let body = ChatBody {
            model: &self.model,
            messages,
            max_tokens,
        };

        tracing::debug!(url = %url, model = %self.model, messages = messages.len(), "completion request");
        let started = Instant::now();
        let result = self.send(&url, &body).await;

        TraceEvent::CompletionRequest {
            model: self.model.clone(),
            messages: messages.len(),
            duration_ms: started.elapsed().as_millis() as u64,
            ok: result.is_ok(),
        }
        .emit();
        result
    }

    fn model(&self) -> &str {
        &self.model
    }
}

impl OpenAiCompatGateway {
    async fn send(&self, url: &str, body: &ChatBody<'_>) -> Result<String> {
        let resp = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        let resp_text = resp.text().await.map_err(from_reqwest)?;

        if !status.is_success() {
            return Err(Error::GatewayFailure(format!(
                "HTTP {} - {}",
                status.as_u16(),
                resp_text
            )));
        }

        let resp_json: Value = serde_json::from_str(&resp_text)
            .map_err(|e| Error::GatewayFailure(format!("malformed response: {e}")))?;
        parse_chat_response(&resp_json)
    }
}
