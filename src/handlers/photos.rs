// handlers/photos.rs - /album/:id/photos and /album/:id/photo/:photo_id
//
// Every photo records its album id under `album`; the album keeps the
// matching photo ids in its `photos` array.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde_json::Value;
use uuid::Uuid;

use super::albums;
use super::resource::{self, parse_id, JsonResult};
use crate::auth::Identity;
use crate::database::{Document, Filter, ID_FIELD};
use crate::error::ApiError;
use crate::middleware::Payload;
use crate::state::AppState;

pub const COLLECTION: &str = "photos";

/// Back-reference from a photo to its album.
pub const ALBUM_FIELD: &str = "album";

pub const PHOTO_NOT_FOUND_MESSAGE: &str = "Photo not found";

fn belongs_to(photo: &Document, album: Uuid) -> bool {
    photo.get(ALBUM_FIELD).and_then(Value::as_str) == Some(album.to_string().as_str())
}

fn album_filter(album: Uuid) -> Filter {
    Filter::new().equals(ALBUM_FIELD, album.to_string())
}

/// GET /album/:id/photos
pub async fn list(State(state): State<AppState>, Path(album): Path<String>) -> JsonResult {
    let album = parse_id(&album)?;
    Ok(resource::many(resource::list(&state, COLLECTION, album_filter(album)).await?))
}

/// GET /album/:id/photo/:photo_id
pub async fn show(State(state): State<AppState>, Path((album, photo)): Path<(String, String)>) -> JsonResult {
    let album = parse_id(&album)?;
    let photo = parse_id(&photo)?;
    let found = resource::show(&state, COLLECTION, photo)
        .await?
        .filter(|doc| belongs_to(doc, album));
    Ok(resource::one(found))
}

/// POST /album/:id/photo - store the photo and append it to the album
pub async fn create(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(album): Path<String>,
    Payload(mut body): Payload,
) -> JsonResult {
    let album = parse_id(&album)?;
    body.insert(ALBUM_FIELD.to_string(), Value::String(album.to_string()));

    let photo = state
        .db
        .execute(|store| async move {
            let photo = store.insert(COLLECTION, body).await?;
            let photo_id = photo.get(ID_FIELD).cloned().unwrap_or(Value::Null);
            if store
                .push(albums::COLLECTION, album, albums::PHOTOS_FIELD, photo_id)
                .await?
                .is_none()
            {
                tracing::warn!("Photo stored for unknown album {}", album);
            }
            Ok(photo)
        })
        .await?;

    let id = photo.get(ID_FIELD).and_then(Value::as_str).unwrap_or("?");
    tracing::info!(
        "Photo {} added to album {} by {}",
        id,
        album,
        identity.subject().unwrap_or("anonymous")
    );
    Ok(Json(Value::Object(photo)))
}

/// PUT /album/:id/photo/:photo_id - a photo cannot be moved to another album
pub async fn update(
    State(state): State<AppState>,
    Path((album, photo)): Path<(String, String)>,
    Payload(mut body): Payload,
) -> JsonResult {
    let album = parse_id(&album)?;
    let photo = parse_id(&photo)?;
    body.remove(ALBUM_FIELD);

    let updated = state
        .db
        .execute(|store| async move {
            match store.find_by_id(COLLECTION, photo).await? {
                Some(existing) if belongs_to(&existing, album) => store.update(COLLECTION, photo, body).await,
                _ => Ok(None),
            }
        })
        .await?;
    Ok(resource::one(updated))
}

/// DELETE /album/:id/photo/:photo_id - remove the photo and its album entry
pub async fn remove(State(state): State<AppState>, Path((album, photo)): Path<(String, String)>) -> JsonResult {
    let album = parse_id(&album)?;
    let photo = parse_id(&photo)?;

    let removed = state
        .db
        .execute(|store| async move {
            match store.find_by_id(COLLECTION, photo).await? {
                Some(existing) if belongs_to(&existing, album) => {}
                _ => return Ok(None),
            }
            let Some(removed) = store.delete(COLLECTION, photo).await? else {
                return Ok(None);
            };
            let photo_id = Value::String(photo.to_string());
            store
                .pull(albums::COLLECTION, album, albums::PHOTOS_FIELD, &photo_id)
                .await?;
            Ok(Some(removed))
        })
        .await?;

    match removed {
        Some(doc) => Ok(Json(Value::Object(doc))),
        None => Err(ApiError::not_found(PHOTO_NOT_FOUND_MESSAGE)),
    }
}
