// handlers/users.rs - /user and /users

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::Value;

use super::resource::{self, parse_id, JsonResult};
use crate::auth::Identity;
use crate::database::{Filter, ID_FIELD};
use crate::middleware::Payload;
use crate::state::AppState;

pub const COLLECTION: &str = "users";

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub lastname: Option<String>,
}

/// POST /user - create a user
pub async fn create(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Payload(body): Payload,
) -> JsonResult {
    let user = resource::create(&state, COLLECTION, body).await?;
    let id = user.get(ID_FIELD).and_then(Value::as_str).unwrap_or("?");
    tracing::info!(
        "User {} created by {}",
        id,
        identity.subject().unwrap_or("anonymous")
    );
    Ok(Json(Value::Object(user)))
}

/// GET /user/:id
pub async fn show(State(state): State<AppState>, Path(id): Path<String>) -> JsonResult {
    let id = parse_id(&id)?;
    Ok(resource::one(resource::show(&state, COLLECTION, id).await?))
}

/// PUT /user/:id - shallow merge of the body into the stored user
pub async fn update(State(state): State<AppState>, Path(id): Path<String>, Payload(body): Payload) -> JsonResult {
    let id = parse_id(&id)?;
    Ok(resource::one(resource::update(&state, COLLECTION, id, body).await?))
}

/// DELETE /user/:id - answers with the removed user
pub async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> JsonResult {
    let id = parse_id(&id)?;
    Ok(resource::one(resource::remove(&state, COLLECTION, id).await?))
}

/// GET /users?lastname= - case-insensitive match on last name
pub async fn list(State(state): State<AppState>, query: Result<Query<UserQuery>, QueryRejection>) -> JsonResult {
    let query = resource::query(query)?;
    let filter = match query.lastname {
        Some(lastname) if !lastname.is_empty() => Filter::new().contains("lastname", lastname),
        _ => Filter::new(),
    };
    Ok(resource::many(resource::list(&state, COLLECTION, filter).await?))
}
