use async_trait::async_trait;
use axum::{
    extract::Request,
    http::StatusCode,
    middleware::from_fn_with_state,
    response::{IntoResponse, Json, Response},
    Router,
};
use serde_json::json;
use std::any::Any;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;

use super::{dispatch, PipelineOutcome, PipelineStage};
use crate::error::{ApiError, UnhandledFault, REDACTED_MESSAGE};

/// Terminal error handler, installed around the routes.
///
/// Faults that escaped a handler (an [`ApiError::Unhandled`] or a panic) are
/// logged in full and answered with `500 {error}`; the message is redacted
/// in production.
#[derive(Debug, Clone, Copy)]
pub struct ErrorHandler {
    redact: bool,
}

impl ErrorHandler {
    pub fn new(redact: bool) -> Self {
        Self { redact }
    }

    pub fn install<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(from_fn_with_state(Arc::new(self), dispatch::<ErrorHandler>))
    }
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "handler panicked".to_string()
    };
    ApiError::unhandled(detail).into_response()
}

#[async_trait]
impl PipelineStage for ErrorHandler {
    type Ticket = ();

    async fn before(&self, request: Request) -> PipelineOutcome {
        PipelineOutcome::Continue(request, ())
    }

    fn after(&self, _ticket: (), response: &mut Response) {
        let Some(UnhandledFault(detail)) = response.extensions_mut().remove::<UnhandledFault>() else {
            return;
        };

        tracing::error!("[ERROR] Unhandled fault: {}", detail);
        let message = if self.redact { REDACTED_MESSAGE.to_string() } else { detail };
        *response = (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": message }))).into_response();
    }
}
