pub mod config;
pub mod users;

use clap::{Parser, Subcommand};

use cg_domain::config::Config;

/// ChatGate: a metered chat-completion gateway.
#[derive(Debug, Parser)]
#[command(name = "chatgate", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Serve,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Manage registered users.
    #[command(subcommand)]
    Users(UsersCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

#[derive(Debug, Subcommand)]
pub enum UsersCommand {
    /// Register a user and print their bearer token once.
    Add {
        /// Display name.
        name: String,
        /// Start with an active subscription.
        #[arg(long)]
        subscribed: bool,
    },
    /// Set a user's subscription status.
    Subscribe {
        /// User id.
        id: i64,
        /// Mark the subscription inactive instead.
        #[arg(long)]
        inactive: bool,
    },
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path in `CG_CONFIG` (or `config.toml`
/// by default).  A missing file yields the built-in defaults.
pub fn load_config() -> anyhow::Result<(Config, String)> {
    let config_path = std::env::var("CG_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = load_config_from(&config_path)?;
    Ok((config, config_path))
}

pub fn load_config_from(config_path: &str) -> anyhow::Result<Config> {
    if !std::path::Path::new(config_path).exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(config_path)
        .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
    toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))
}
