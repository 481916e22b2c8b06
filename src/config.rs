use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::{MemoryStorage, SqliteStorage, StoreConnection};

/// Connection parameters for the alternate store a shadow type writes to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "driver", rename_all = "snake_case")]
pub enum StoreConfig {
    Sqlite { path: PathBuf },
    SqliteMemory,
    Memory,
}

impl StoreConfig {
    pub fn sqlite<P: AsRef<Path>>(path: P) -> Self {
        StoreConfig::Sqlite { path: path.as_ref().to_path_buf() }
    }

    pub fn connect(&self) -> Result<Arc<dyn StoreConnection>> {
        log::debug!("STORE CONNECT: {:?}", self);
        let store: Arc<dyn StoreConnection> = match self {
            StoreConfig::Sqlite { path } => Arc::new(SqliteStorage::open(path)?),
            StoreConfig::SqliteMemory => Arc::new(SqliteStorage::open_memory()?),
            StoreConfig::Memory => Arc::new(MemoryStorage::new()),
        };
        Ok(store)
    }
}

/// Binding of one shadow type: the delegate entity it borrows its schema
/// from and the store its records live in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub delegate: String,
    pub store: StoreConfig,
}

impl ProxyConfig {
    pub fn new(delegate: &str, store: StoreConfig) -> Self {
        ProxyConfig { delegate: delegate.to_string(), store }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}
