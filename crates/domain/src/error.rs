/// Shared error type used across all ChatGate crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("usage limit exceeded: {used_minutes} of {limit_minutes} minutes used today")]
    QuotaExceeded { used_minutes: i64, limit_minutes: i64 },

    #[error("conversation not found")]
    NotFound,

    #[error("completion gateway: {0}")]
    GatewayFailure(String),

    #[error("completion gateway misconfigured: {0}")]
    GatewayMisconfigured(String),

    #[error("storage: {0}")]
    Storage(String),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config: {0}")]
    Config(String),
}

impl Error {
    /// Short machine-readable tag, used in logs and API error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Unauthenticated(_) => "unauthenticated",
            Error::Validation(_) => "validation_error",
            Error::QuotaExceeded { .. } => "quota_exceeded",
            Error::NotFound => "not_found",
            Error::GatewayFailure(_) => "gateway_failure",
            Error::GatewayMisconfigured(_) => "gateway_misconfigured",
            Error::Storage(_) => "storage",
            Error::Json(_) => "json",
            Error::Config(_) => "config",
        }
    }

    /// Caller-side rejections; everything else is a server failure.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::Unauthenticated(_)
                | Error::Validation(_)
                | Error::QuotaExceeded { .. }
                | Error::NotFound
        )
    }

    /// Log this error against the subject and conversation it concerns.
    /// Either may be unknown when the failure came before resolution.
    pub fn log(&self, subject_key: Option<&str>, conversation_id: Option<i64>) {
        if self.is_rejection() {
            tracing::warn!(
                subject_key,
                conversation_id,
                kind = self.kind(),
                error = %self,
                "request rejected"
            );
        } else {
            tracing::error!(
                subject_key,
                conversation_id,
                kind = self.kind(),
                error = %self,
                "request failed"
            );
        }
    }
}


pub type Result<T> = std::result::Result<T, Error>;
