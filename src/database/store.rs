use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use super::supervisor::ConnectionState;

/// A stored record: a JSON object carrying its identifier under [`ID_FIELD`].
pub type Document = Map<String, Value>;

/// Key under which every document exposes its identifier.
pub const ID_FIELD: &str = "_id";

/// Errors from the data-access layer
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("data store is not connected (state: {0})")]
    Unavailable(ConnectionState),

    #[error("data store connection lost: {0}")]
    Connection(String),

    #[error("unsupported data store URI: {0}")]
    UnsupportedUri(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("corrupt document in '{collection}': {reason}")]
    Corrupt { collection: String, reason: String },

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl StoreError {
    /// Whether this failure means the link itself is gone, as opposed to a
    /// single operation failing.
    pub fn is_connection(&self) -> bool {
        match self {
            StoreError::Connection(_) => true,
            StoreError::Sqlx(err) => matches!(
                err,
                sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            ),
            _ => false,
        }
    }
}

/// A single predicate on a top-level document field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equals(String, Value),
    /// Case-insensitive substring match on a string field.
    Contains(String, String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn equals(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Equals(field.into(), value.into()));
        self
    }

    pub fn contains(mut self, field: impl Into<String>, needle: impl Into<String>) -> Self {
        self.conditions.push(Condition::Contains(field.into(), needle.into()));
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Evaluate the filter against an in-memory document.
    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions.iter().all(|condition| match condition {
            Condition::Equals(field, expected) => doc.get(field) == Some(expected),
            Condition::Contains(field, needle) => doc
                .get(field)
                .and_then(Value::as_str)
                .map(|s| s.to_lowercase().contains(&needle.to_lowercase()))
                .unwrap_or(false),
        })
    }
}

/// Data-access object handed to resource handlers.
///
/// `insert`/`update` never let callers choose or change [`ID_FIELD`]; it is
/// stripped from the payload and assigned by the store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Cheap round trip used by the connection supervisor to detect link loss.
    async fn ping(&self) -> Result<(), StoreError>;

    async fn insert(&self, collection: &str, doc: Document) -> Result<Document, StoreError>;

    async fn find_by_id(&self, collection: &str, id: Uuid) -> Result<Option<Document>, StoreError>;

    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError>;

    /// Shallow merge of `patch` into the stored document; returns the new version.
    async fn update(&self, collection: &str, id: Uuid, patch: Document) -> Result<Option<Document>, StoreError>;

    /// Remove and return the document.
    async fn delete(&self, collection: &str, id: Uuid) -> Result<Option<Document>, StoreError>;

    /// Append `value` to the array at `field`, creating it if missing.
    async fn push(&self, collection: &str, id: Uuid, field: &str, value: Value) -> Result<Option<Document>, StoreError>;

    /// Remove every occurrence of `value` from the array at `field`.
    async fn pull(&self, collection: &str, id: Uuid, field: &str, value: &Value) -> Result<Option<Document>, StoreError>;

    async fn close(&self) -> Result<(), StoreError>;
}

/// Drop the identifier key from a client-supplied payload.
pub(crate) fn strip_id(mut doc: Document) -> Document {
    doc.remove(ID_FIELD);
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn filter_equals_and_contains() {
        let album = doc(json!({ "title": "Summer In Lisbon", "year": 2023 }));

        assert!(Filter::new().matches(&album));
        assert!(Filter::new().contains("title", "lisbon").matches(&album));
        assert!(Filter::new().equals("year", 2023).matches(&album));
        assert!(!Filter::new().contains("title", "porto").matches(&album));
        assert!(!Filter::new().contains("year", "20").matches(&album));
        assert!(!Filter::new().equals("missing", "x").matches(&album));
    }

    #[test]
    fn connection_errors_are_classified() {
        assert!(StoreError::Connection("gone".into()).is_connection());
        assert!(StoreError::Sqlx(sqlx::Error::PoolClosed).is_connection());
        assert!(!StoreError::QueryError("syntax".into()).is_connection());
        assert!(!StoreError::Unavailable(ConnectionState::Error).is_connection());
    }
}
