// handlers/status.rs - GET /status and the catch-all responder

use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::error::{ApiError, NOT_FOUND_MESSAGE};

/// GET /status - unauthenticated liveness check
pub async fn status() -> Json<Value> {
    Json(json!({
        "status": "online",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

/// Any unmatched method and path.
pub async fn not_found() -> ApiError {
    ApiError::not_found(NOT_FOUND_MESSAGE)
}
