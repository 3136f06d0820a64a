//! Shared helpers for gateway adapters.

use cg_domain::error::{Error, Result};

/// Convert a [`reqwest::Error`] into a gateway failure.
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::GatewayFailure(format!("request timed out: {e}"))
    } else {
        Error::GatewayFailure(e.to_string())
    }
}

/// Read the bearer credential from the named environment variable.
///
/// A missing or blank value is `GatewayMisconfigured`.
pub fn resolve_api_key(env_var: &str) -> Result<String> {
    match std::env::var(env_var) {
        Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_owned()),
        _ => Err(Error::GatewayMisconfigured(format!(
            "environment variable '{env_var}' is not set"
        ))),
    }
}
