//! AppState construction shared by `serve` and the router tests.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;

use cg_conversations::{ContextBuilder, IdentityResolver, TokenAuthenticator};
use cg_domain::config::{Config, ConfigSeverity};
use cg_domain::Error;
use cg_metering::{EntitlementPolicy, UsageLedger};
use cg_providers::{CompletionGateway, OpenAiCompatGateway};
use cg_storage::Stores;

use crate::state::AppState;

/// Validate config, open storage, build the completion gateway and return
/// a fully-wired [`AppState`].
pub async fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Storage ──────────────────────────────────────────────────────
    let stores = cg_storage::open(&config.storage)
        .await
        .context("opening storage")?;
    tracing::info!(backend = ?config.storage.backend, "storage ready");

    // ── Completion gateway ───────────────────────────────────────────
    let gateway: Option<Arc<dyn CompletionGateway>> =
        match OpenAiCompatGateway::from_config(&config.llm) {
            Ok(gw) => {
                tracing::info!(
                    base_url = %config.llm.base_url,
                    model = %config.llm.model,
                    "completion gateway ready"
                );
                Some(Arc::new(gw))
            }
            Err(Error::GatewayMisconfigured(reason)) => {
                tracing::warn!(
                    reason = %reason,
                    "completion gateway unavailable; conversation turns will fail until {} is set",
                    config.llm.api_key_env
                );
                None
            }
            Err(e) => return Err(e).context("initializing completion gateway"),
        };

    assemble_state(config, stores, gateway)
}

/// Wire the pipeline components around already-opened stores.
pub fn assemble_state(
    config: Arc<Config>,
    stores: Stores,
    gateway: Option<Arc<dyn CompletionGateway>>,
) -> anyhow::Result<AppState> {
    // ── Identity ─────────────────────────────────────────────────────
    let authenticator = Arc::new(TokenAuthenticator::new(stores.users.clone()));
    let resolver = Arc::new(
        IdentityResolver::new(authenticator, stores.guests.clone())
            .context("initializing identity resolver")?,
    );

    // ── Metering ─────────────────────────────────────────────────────
    let timezone = config
        .entitlements
        .timezone()
        .context("entitlements.period_timezone")?;
    let ledger = Arc::new(UsageLedger::new(
        stores.usage.clone(),
        EntitlementPolicy::new(&config.entitlements),
        timezone,
    ));
    tracing::info!(
        unsubscribed_daily_minutes = config.entitlements.unsubscribed_daily_minutes,
        guest_daily_minutes = config.entitlements.guest_daily_minutes,
        timezone = %timezone,
        "usage ledger ready"
    );

    // ── Context ──────────────────────────────────────────────────────
    let context = Arc::new(ContextBuilder::new(
        stores.conversations.clone(),
        &config.llm,
        &config.context,
    ));

    Ok(AppState {
        config,
        stores,
        gateway,
        resolver,
        ledger,
        context,
        started_at: Instant::now(),
    })
}
