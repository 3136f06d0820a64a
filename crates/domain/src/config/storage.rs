use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local maps. Nothing survives a restart.
    Memory,
    #[default]
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// sqlx connection URL, e.g. `sqlite://./data/chatgate.db`.
    #[serde(default = "d_database_url")]
    pub database_url: String,
    #[serde(default = "d_5")]
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            database_url: d_database_url(),
            max_connections: 5,
        }
    }
}

fn d_database_url() -> String {
    "sqlite://./data/chatgate.db".into()
}
fn d_5() -> u32 {
    5
}
