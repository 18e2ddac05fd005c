use async_trait::async_trait;
use std::sync::Arc;

use super::memory::MemoryStore;
use super::postgres::PgDocumentStore;
use super::store::{DocumentStore, StoreError};
use crate::config::DatabaseConfig;

/// Opens a link to the data store named by a URI.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, uri: &str) -> Result<Arc<dyn DocumentStore>, StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

impl StoreKind {
    /// Classify a data store URI by scheme.
    pub fn from_uri(uri: &str) -> Result<Self, StoreError> {
        let parsed = url::Url::parse(uri).map_err(|_| StoreError::UnsupportedUri(uri.to_string()))?;
        match parsed.scheme() {
            "postgres" | "postgresql" => Ok(StoreKind::Postgres),
            "memory" => Ok(StoreKind::Memory),
            _ => Err(StoreError::UnsupportedUri(uri.to_string())),
        }
    }
}

/// Default connector: PostgreSQL for `postgres://` URIs, a process-wide
/// in-memory store for `memory://`.
///
/// The memory store outlives individual connections so that reconnecting
/// finds the same data, the way a real server would.
pub struct StoreConnector {
    settings: DatabaseConfig,
    memory: Arc<MemoryStore>,
}

impl StoreConnector {
    pub fn new(settings: DatabaseConfig) -> Self {
        Self {
            settings,
            memory: Arc::new(MemoryStore::new()),
        }
    }

    pub fn memory(&self) -> Arc<MemoryStore> {
        self.memory.clone()
    }
}

#[async_trait]
impl Connector for StoreConnector {
    async fn connect(&self, uri: &str) -> Result<Arc<dyn DocumentStore>, StoreError> {
        match StoreKind::from_uri(uri)? {
            StoreKind::Postgres => {
                let store = PgDocumentStore::connect(uri, &self.settings).await?;
                Ok(Arc::new(store))
            }
            StoreKind::Memory => {
                self.memory.ping().await?;
                Ok(self.memory.clone())
            }
        }
    }
}
