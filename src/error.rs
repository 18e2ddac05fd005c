// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::auth::AuthFault;
use crate::database::StoreError;

pub const BAD_REQUEST_MESSAGE: &str = "Bad request";
pub const NOT_FOUND_MESSAGE: &str = "Not Found";
pub const PERSISTENCE_MESSAGE: &str = "Internal Server error";
pub const RATE_LIMIT_MESSAGE: &str = "Trop de requêtes, réessayez plus tard.";
pub const PAYLOAD_TOO_LARGE_MESSAGE: &str = "Payload Too Large";
/// Body of an unhandled fault when details must not leak.
pub const REDACTED_MESSAGE: &str = "Erreur interne serveur";

/// HTTP API error with appropriate status codes and client-friendly messages.
///
/// Handlers return `Result<_, ApiError>`; this is the single place where a
/// failure becomes a wire response.
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),

    // 401 / 403 / 500 from the token check
    Auth(AuthFault),

    // 404 Not Found
    NotFound(String),

    // 413 Payload Too Large
    PayloadTooLarge,

    // 429 Too Many Requests
    TooManyRequests,

    // 500 from the data store
    Persistence(StoreError),

    // 500 for anything else; finalized by the terminal error handler
    Unhandled(String),
}

/// Marker left on responses produced from [`ApiError::Unhandled`] so the
/// terminal error handler can log and (un)redact them.
#[derive(Debug, Clone)]
pub struct UnhandledFault(pub String);

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::Auth(fault) => fault.status_code(),
            ApiError::NotFound(_) => 404,
            ApiError::PayloadTooLarge => 413,
            ApiError::TooManyRequests => 429,
            ApiError::Persistence(_) => 500,
            ApiError::Unhandled(_) => 500,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::Auth(fault) => fault.message(),
            ApiError::NotFound(msg) => msg,
            ApiError::PayloadTooLarge => PAYLOAD_TOO_LARGE_MESSAGE,
            ApiError::TooManyRequests => RATE_LIMIT_MESSAGE,
            ApiError::Persistence(_) => PERSISTENCE_MESSAGE,
            ApiError::Unhandled(_) => REDACTED_MESSAGE,
        }
    }

    /// Convert to JSON response body.
    ///
    /// Handler-level faults use `{code, message}`; guard and terminal faults
    /// use `{error}`.
    pub fn to_json(&self) -> Value {
        match self {
            ApiError::Auth(_) | ApiError::TooManyRequests | ApiError::Unhandled(_) => {
                json!({ "error": self.message() })
            }
            _ => json!({
                "code": self.status_code(),
                "message": self.message()
            }),
        }
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request() -> Self {
        ApiError::BadRequest(BAD_REQUEST_MESSAGE.to_string())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn unhandled(message: impl Into<String>) -> Self {
        ApiError::Unhandled(message.into())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Corrupt { .. } => ApiError::Unhandled(err.to_string()),
            other => ApiError::Persistence(other),
        }
    }
}

impl From<AuthFault> for ApiError {
    fn from(fault: AuthFault) -> Self {
        ApiError::Auth(fault)
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Persistence(err) => write!(f, "{}: {}", PERSISTENCE_MESSAGE, err),
            ApiError::Unhandled(detail) => write!(f, "{}", detail),
            _ => write!(f, "{}", self.message()),
        }
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match &self {
            ApiError::Persistence(err) => tracing::error!("Data store operation failed: {}", err),
            ApiError::Auth(AuthFault::Internal(detail)) => {
                tracing::error!("Token verification fault: {}", detail)
            }
            _ => {}
        }

        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(self.to_json())).into_response();
        if let ApiError::Unhandled(detail) = self {
            response.extensions_mut().insert(UnhandledFault(detail));
        }
        response
    }
}
