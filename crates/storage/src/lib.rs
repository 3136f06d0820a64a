//! Persistence for usage records, conversations, guests, and users.

pub mod memory;
pub mod sqlite;
pub mod traits;

use std::sync::Arc;

use cg_domain::config::{StorageBackend, StorageConfig};
use cg_domain::Result;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{ConversationStore, GuestStore, TurnWrite, UsageStore, UserStore};

/// Every store the gateway needs, behind trait objects.
#[derive(Clone)]
pub struct Stores {
    pub usage: Arc<dyn UsageStore>,
    pub conversations: Arc<dyn ConversationStore>,
    pub guests: Arc<dyn GuestStore>,
    pub users: Arc<dyn UserStore>,
}

impl Stores {
    /// All four stores served by one backend value.
    pub fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: UsageStore + ConversationStore + GuestStore + UserStore + 'static,
    {
        Self {
            usage: backend.clone(),
            conversations: backend.clone(),
            guests: backend.clone(),
            users: backend,
        }
    }

    pub fn memory() -> Self {
        Self::from_backend(Arc::new(MemoryStore::new()))
    }
}

/// Open the backend selected in config.
pub async fn open(config: &StorageConfig) -> Result<Stores> {
    match config.backend {
        StorageBackend::Memory => {
            tracing::warn!("using in-memory storage; data is lost on restart");
            Ok(Stores::memory())
        }
        StorageBackend::Sqlite => {
            if let Some(dir) = sqlite_parent_dir(&config.database_url) {
                std::fs::create_dir_all(&dir).map_err(|e| {
                    cg_domain::Error::Storage(format!(
                        "failed to create database directory {}: {e}",
                        dir.display()
                    ))
                })?;
            }
            let store = SqliteStore::connect(&config.database_url, config.max_connections).await?;
            tracing::info!(url = %config.database_url, "sqlite storage ready");
            Ok(Stores::from_backend(Arc::new(store)))
        }
    }
}

/// Parent directory of a file-backed sqlite URL, if it has one.
fn sqlite_parent_dir(url: &str) -> Option<std::path::PathBuf> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path.starts_with(":memory:") {
        return None;
    }
    std::path::Path::new(path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.to_path_buf())
}
