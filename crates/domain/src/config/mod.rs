mod context;
mod entitlements;
mod llm;
mod observability;
mod server;
mod storage;

pub use context::*;
pub use entitlements::*;
pub use llm::*;
pub use observability::*;
pub use server::*;
pub use storage::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub entitlements: EntitlementConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl ConfigError {
    fn error(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError::error("server.port", "port must be greater than 0"));
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError::error("server.host", "host must not be empty"));
        }

        if self.llm.base_url.is_empty() {
            errors.push(ConfigError::error("llm.base_url", "base_url must not be empty"));
        }
        if self.llm.max_tokens == 0 {
            errors.push(ConfigError::error("llm.max_tokens", "max_tokens must be greater than 0"));
        }
        if std::env::var(&self.llm.api_key_env)
            .map(|v| v.trim().is_empty())
            .unwrap_or(true)
        {
            errors.push(ConfigError::warning(
                "llm.api_key_env",
                format!(
                    "{} is not set; conversation requests will fail until it is",
                    self.llm.api_key_env
                ),
            ));
        }

        // Guests must always get less than signed-in, unsubscribed users.
        if self.entitlements.guest_daily_minutes >= self.entitlements.unsubscribed_daily_minutes {
            errors.push(ConfigError::error(
                "entitlements.guest_daily_minutes",
                format!(
                    "guest allowance ({}) must be smaller than the unsubscribed allowance ({})",
                    self.entitlements.guest_daily_minutes,
                    self.entitlements.unsubscribed_daily_minutes
                ),
            ));
        }
        if let Err(e) = self.entitlements.timezone() {
            errors.push(ConfigError::error("entitlements.period_timezone", e.to_string()));
        }

        if self.context.max_turns == 0 {
            errors.push(ConfigError::error("context.max_turns", "max_turns must be greater than 0"));
        }
        if self.context.max_input_chars == 0 {
            errors.push(ConfigError::error(
                "context.max_input_chars",
                "max_input_chars must be greater than 0",
            ));
        }
        if self.context.name_max_chars == 0 {
            errors.push(ConfigError::error(
                "context.name_max_chars",
                "name_max_chars must be greater than 0",
            ));
        }

        if self.storage.backend == StorageBackend::Sqlite && self.storage.database_url.is_empty() {
            errors.push(ConfigError::error(
                "storage.database_url",
                "database_url is required for the sqlite backend",
            ));
        }
        if self.storage.backend == StorageBackend::Memory {
            errors.push(ConfigError::warning(
                "storage.backend",
                "memory backend loses all conversations and usage on restart",
            ));
        }

        if self.server.cors.allowed_origins.len() == 1 && self.server.cors.allowed_origins[0] == "*" {
            errors.push(ConfigError::warning(
                "server.cors.allowed_origins",
                "wildcard \"*\" allows all origins (not recommended for production)",
            ));
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn errors(cfg: &Config) -> Vec<ConfigError> {
        cfg.validate()
            .into_iter()
            .filter(|e| e.severity == ConfigSeverity::Error)
            .collect()
    }

    #[test]
    fn defaults_have_no_errors() {
        assert!(errors(&Config::default()).is_empty());
    }

    #[test]
    fn guest_allowance_must_stay_below_user_allowance() {
        let mut cfg = Config::default();
        cfg.entitlements.guest_daily_minutes = 30;
        cfg.entitlements.unsubscribed_daily_minutes = 30;
        let errs = errors(&cfg);
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].field, "entitlements.guest_daily_minutes");
    }

    #[test]
    fn unknown_timezone_is_an_error() {
        let mut cfg = Config::default();
        cfg.entitlements.period_timezone = "Mars/Olympus".into();
        assert!(errors(&cfg)
            .iter()
            .any(|e| e.field == "entitlements.period_timezone"));
    }

    #[test]
    fn sqlite_backend_needs_url() {
        let mut cfg = Config::default();
        cfg.storage.backend = StorageBackend::Sqlite;
        cfg.storage.database_url = String::new();
        assert!(errors(&cfg).iter().any(|e| e.field == "storage.database_url"));
    }

    #[test]
    fn zero_max_turns_rejected() {
        let mut cfg = Config::default();
        cfg.context.max_turns = 0;
        assert!(errors(&cfg).iter().any(|e| e.field == "context.max_turns"));
    }

    #[test]
    fn display_includes_severity_tag() {
        let e = ConfigError::warning("a.b", "c");
        assert_eq!(e.to_string(), "[WARN] a.b: c");
    }
}
