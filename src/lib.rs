pub mod config;
pub mod error;
pub mod proxy;
pub mod schema;
pub mod storage;
pub mod value;

pub use config::{ProxyConfig, StoreConfig};
pub use error::{Error, Result};
pub use proxy::{DeleteOutcome, ProxyBinding, ProxyList, Record, Refresh, Registry, ShadowEntity, WriteKind, WriteOutcome};
pub use schema::{Catalog, EntityDefinition, EntityMetadata, FieldType, Principal, Schema};
pub use storage::{MemoryStorage, SqliteStorage, StoreConnection};
pub use value::{Filter, Row, Value};

pub use rusqlite;
pub use rusqlite_migration;
