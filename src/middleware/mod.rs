//! Request pipeline stages.
//!
//! Every cross-cutting stage implements [`PipelineStage`] and runs through
//! the single [`dispatch`] function: `before` either lets the request
//! continue or short-circuits with a final response, and `after` may decorate
//! the response on the way out. The fixed order of stages lives in
//! [`pipeline::Pipeline`].

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

pub mod auth;
pub mod body_parser;
pub mod error_handler;
pub mod pipeline;
pub mod rate_limit;
pub mod request_log;
pub mod security_headers;

pub use auth::BearerAuth;
pub use body_parser::{BodyParser, ParsedBody, Payload};
pub use error_handler::ErrorHandler;
pub use pipeline::{Pipeline, StageKind};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use request_log::RequestLog;
pub use security_headers::SecurityHeaders;

/// Result of a stage's inbound check.
///
/// `Continue` hands the (possibly modified) request on together with
/// whatever the stage needs to finish the response later.
pub enum PipelineOutcome<T = ()> {
    Continue(Request, T),
    ShortCircuit(Response),
}

#[async_trait]
pub trait PipelineStage: Send + Sync + 'static {
    /// Per-request data carried from `before` to `after`.
    type Ticket: Send;

    async fn before(&self, request: Request) -> PipelineOutcome<Self::Ticket>;

    fn after(&self, _ticket: Self::Ticket, _response: &mut Response) {}
}

/// Run one stage around the rest of the chain. A short-circuit skips every
/// later stage and the handler.
pub async fn dispatch<S: PipelineStage>(State(stage): State<Arc<S>>, request: Request, next: Next) -> Response {
    match stage.before(request).await {
        PipelineOutcome::ShortCircuit(response) => response,
        PipelineOutcome::Continue(request, ticket) => {
            let mut response = next.run(request).await;
            stage.after(ticket, &mut response);
            response
        }
    }
}
