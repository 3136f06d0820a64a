use std::sync::Arc;
use std::time::Instant;

use cg_conversations::{ContextBuilder, IdentityResolver};
use cg_domain::config::Config;
use cg_metering::UsageLedger;
use cg_providers::CompletionGateway;
use cg_storage::Stores;

/// Shared application state passed to all API handlers.
///
/// Fields are grouped by concern:
/// - **Core services**: config, stores, completion gateway
/// - **Pipeline**: identity resolution, metering, context assembly
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub stores: Stores,
    /// `None` when the upstream credential is missing; turn requests then
    /// fail with `GatewayMisconfigured` before doing any other work.
    pub gateway: Option<Arc<dyn CompletionGateway>>,

    // ── Pipeline ──────────────────────────────────────────────────────
    pub resolver: Arc<IdentityResolver>,
    pub ledger: Arc<UsageLedger>,
    pub context: Arc<ContextBuilder>,

    pub started_at: Instant,
}
