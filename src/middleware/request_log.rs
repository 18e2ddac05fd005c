use async_trait::async_trait;
use axum::extract::Request;
use chrono::{SecondsFormat, Utc};

use super::{PipelineOutcome, PipelineStage};

/// Development request logger: timestamp, method and path.
pub struct RequestLog;

#[async_trait]
impl PipelineStage for RequestLog {
    type Ticket = ();

    async fn before(&self, request: Request) -> PipelineOutcome {
        tracing::info!(
            "[{}] {} {}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            request.method(),
            request.uri()
        );
        PipelineOutcome::Continue(request, ())
    }
}
