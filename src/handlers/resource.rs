// Shared CRUD plumbing for document-backed resources.

use axum::{
    extract::{rejection::QueryRejection, Query},
    Json,
};
use serde_json::Value;
use uuid::Uuid;

use crate::database::{Document, Filter};
use crate::error::ApiError;
use crate::state::AppState;

pub type JsonResult = Result<Json<Value>, ApiError>;

pub fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| {
        tracing::debug!("Rejected malformed id '{}'", raw);
        ApiError::bad_request()
    })
}

/// Unwrap a query-string extraction; a rejection is an ordinary bad request.
pub fn query<T>(extracted: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    match extracted {
        Ok(Query(query)) => Ok(query),
        Err(rejection) => {
            tracing::debug!("Rejected query string: {}", rejection);
            Err(ApiError::bad_request())
        }
    }
}

/// A single document, or `{}` when there is none.
pub fn one(doc: Option<Document>) -> Json<Value> {
    Json(Value::Object(doc.unwrap_or_default()))
}

pub fn many(docs: Vec<Document>) -> Json<Value> {
    Json(Value::Array(docs.into_iter().map(Value::Object).collect()))
}

pub async fn create(state: &AppState, collection: &'static str, doc: Document) -> Result<Document, ApiError> {
    let saved = state
        .db
        .execute(|store| async move { store.insert(collection, doc).await })
        .await?;
    Ok(saved)
}

pub async fn show(state: &AppState, collection: &'static str, id: Uuid) -> Result<Option<Document>, ApiError> {
    let found = state
        .db
        .execute(|store| async move { store.find_by_id(collection, id).await })
        .await?;
    Ok(found)
}

pub async fn update(
    state: &AppState,
    collection: &'static str,
    id: Uuid,
    patch: Document,
) -> Result<Option<Document>, ApiError> {
    let updated = state
        .db
        .execute(|store| async move { store.update(collection, id, patch).await })
        .await?;
    Ok(updated)
}

pub async fn remove(state: &AppState, collection: &'static str, id: Uuid) -> Result<Option<Document>, ApiError> {
    let removed = state
        .db
        .execute(|store| async move { store.delete(collection, id).await })
        .await?;
    Ok(removed)
}

pub async fn list(state: &AppState, collection: &'static str, filter: Filter) -> Result<Vec<Document>, ApiError> {
    let docs = state
        .db
        .execute(|store| async move { store.find(collection, &filter).await })
        .await?;
    Ok(docs)
}
