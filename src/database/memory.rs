use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::store::{strip_id, Document, DocumentStore, Filter, StoreError, ID_FIELD};

/// In-process document store selected by `memory://` URIs.
///
/// The store can be taken offline to behave like an unreachable server:
/// every call then fails with a connection error until it is brought back.
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    online: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            online: AtomicBool::new(true),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Number of documents in a collection, regardless of link state.
    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.is_online() {
            Ok(())
        } else {
            Err(StoreError::Connection("memory store is offline".to_string()))
        }
    }

    async fn modify<F>(&self, collection: &str, id: Uuid, apply: F) -> Result<Option<Document>, StoreError>
    where
        F: FnOnce(&mut Document),
    {
        self.ensure_online()?;
        let key = Value::String(id.to_string());
        let mut collections = self.collections.write().await;
        let Some(doc) = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| d.get(ID_FIELD) == Some(&key)))
        else {
            return Ok(None);
        };
        apply(doc);
        Ok(Some(doc.clone()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.ensure_online()
    }

    async fn insert(&self, collection: &str, doc: Document) -> Result<Document, StoreError> {
        self.ensure_online()?;
        let mut doc = strip_id(doc);
        doc.insert(ID_FIELD.to_string(), Value::String(Uuid::new_v4().to_string()));
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .push(doc.clone());
        Ok(doc)
    }

    async fn find_by_id(&self, collection: &str, id: Uuid) -> Result<Option<Document>, StoreError> {
        self.ensure_online()?;
        let key = Value::String(id.to_string());
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| d.get(ID_FIELD) == Some(&key)))
            .cloned())
    }

    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        self.ensure_online()?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| docs.iter().filter(|d| filter.matches(d)).cloned().collect())
            .unwrap_or_default())
    }

    async fn update(&self, collection: &str, id: Uuid, patch: Document) -> Result<Option<Document>, StoreError> {
        let patch = strip_id(patch);
        self.modify(collection, id, move |doc| doc.extend(patch)).await
    }

    async fn delete(&self, collection: &str, id: Uuid) -> Result<Option<Document>, StoreError> {
        self.ensure_online()?;
        let key = Value::String(id.to_string());
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(None);
        };
        Ok(docs
            .iter()
            .position(|d| d.get(ID_FIELD) == Some(&key))
            .map(|index| docs.remove(index)))
    }

    async fn push(&self, collection: &str, id: Uuid, field: &str, value: Value) -> Result<Option<Document>, StoreError> {
        self.modify(collection, id, move |doc| {
            let slot = doc
                .entry(field.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            match slot {
                Value::Array(items) => items.push(value),
                other => *other = Value::Array(vec![value]),
            }
        })
        .await
    }

    async fn pull(&self, collection: &str, id: Uuid, field: &str, value: &Value) -> Result<Option<Document>, StoreError> {
        self.modify(collection, id, |doc| {
            if let Some(Value::Array(items)) = doc.get_mut(field) {
                items.retain(|item| item != value);
            }
        })
        .await
    }

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
