// handlers/albums.rs - /album and /albums

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use super::photos;
use super::resource::{self, parse_id, JsonResult};
use crate::auth::Identity;
use crate::database::{Filter, ID_FIELD};
use crate::middleware::Payload;
use crate::state::AppState;

pub const COLLECTION: &str = "albums";

/// Array of photo ids kept on every album.
pub const PHOTOS_FIELD: &str = "photos";

#[derive(Debug, Deserialize)]
pub struct AlbumQuery {
    pub title: Option<String>,
}

/// POST /album - create an album
pub async fn create(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Payload(mut body): Payload,
) -> JsonResult {
    if !matches!(body.get(PHOTOS_FIELD), Some(Value::Array(_))) {
        body.insert(PHOTOS_FIELD.to_string(), Value::Array(Vec::new()));
    }
    let album = resource::create(&state, COLLECTION, body).await?;
    let id = album.get(ID_FIELD).and_then(Value::as_str).unwrap_or("?");
    tracing::info!(
        "Album {} created by {}",
        id,
        identity.subject().unwrap_or("anonymous")
    );
    Ok(Json(Value::Object(album)))
}

/// GET /album/:id - the album with its photo ids replaced by the photos
pub async fn show(State(state): State<AppState>, Path(id): Path<String>) -> JsonResult {
    let id = parse_id(&id)?;
    let album = state
        .db
        .execute(|store| async move {
            let Some(mut album) = store.find_by_id(COLLECTION, id).await? else {
                return Ok(None);
            };
            let ids: Vec<Uuid> = match album.get(PHOTOS_FIELD) {
                Some(Value::Array(items)) => items
                    .iter()
                    .filter_map(Value::as_str)
                    .filter_map(|raw| Uuid::parse_str(raw).ok())
                    .collect(),
                _ => Vec::new(),
            };
            let mut populated = Vec::with_capacity(ids.len());
            for photo_id in ids {
                if let Some(photo) = store.find_by_id(photos::COLLECTION, photo_id).await? {
                    populated.push(Value::Object(photo));
                }
            }
            album.insert(PHOTOS_FIELD.to_string(), Value::Array(populated));
            Ok(Some(album))
        })
        .await?;
    Ok(resource::one(album))
}

/// PUT /album/:id - shallow merge of the body into the stored album
pub async fn update(State(state): State<AppState>, Path(id): Path<String>, Payload(body): Payload) -> JsonResult {
    let id = parse_id(&id)?;
    Ok(resource::one(resource::update(&state, COLLECTION, id, body).await?))
}

/// DELETE /album/:id
pub async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> JsonResult {
    let id = parse_id(&id)?;
    Ok(resource::one(resource::remove(&state, COLLECTION, id).await?))
}

/// GET /albums?title= - case-insensitive match on title
pub async fn list(State(state): State<AppState>, query: Result<Query<AlbumQuery>, QueryRejection>) -> JsonResult {
    let query = resource::query(query)?;
    let filter = match query.title {
        Some(title) if !title.is_empty() => Filter::new().contains("title", title),
        _ => Filter::new(),
    };
    Ok(resource::many(resource::list(&state, COLLECTION, filter).await?))
}
