use async_trait::async_trait;
use axum::{
    extract::Request,
    http::header,
    response::IntoResponse,
};

use super::{PipelineOutcome, PipelineStage};
use crate::auth::TokenVerifier;
use crate::error::ApiError;

/// Per-route bearer-token guard.
///
/// On success the verified [`Identity`](crate::auth::Identity) is inserted
/// into this request's extensions; handlers read it with
/// `Extension<Identity>`.
pub struct BearerAuth {
    verifier: TokenVerifier,
}

impl BearerAuth {
    pub fn new(verifier: TokenVerifier) -> Self {
        Self { verifier }
    }
}

#[async_trait]
impl PipelineStage for BearerAuth {
    type Ticket = ();

    async fn before(&self, mut request: Request) -> PipelineOutcome {
        match self.verifier.verify(request.headers().get(header::AUTHORIZATION)) {
            Ok(identity) => {
                request.extensions_mut().insert(identity);
                PipelineOutcome::Continue(request, ())
            }
            Err(fault) => {
                tracing::debug!(
                    "Refused {} {}: {}",
                    request.method(),
                    request.uri().path(),
                    fault
                );
                PipelineOutcome::ShortCircuit(ApiError::from(fault).into_response())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{issue_token, Identity};
    use axum::{body::Body, http};
    use serde_json::{json, Map, Value};

    fn signed_request(subject: &str) -> Request {
        let mut claims = Map::new();
        claims.insert("sub".to_string(), json!(subject));
        let token = issue_token(&claims, "secret").unwrap();
        http::Request::builder()
            .method(http::Method::POST)
            .uri("/album")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap()
    }

    fn continued_identity(outcome: PipelineOutcome) -> Identity {
        match outcome {
            PipelineOutcome::Continue(request, ()) => request.extensions().get::<Identity>().cloned().unwrap(),
            PipelineOutcome::ShortCircuit(response) => panic!("refused with {}", response.status()),
        }
    }

    #[tokio::test]
    async fn each_request_carries_its_own_identity() {
        let guard = BearerAuth::new(TokenVerifier::new("secret"));

        let (ada, grace) = tokio::join!(guard.before(signed_request("ada")), guard.before(signed_request("grace")));

        let ada = continued_identity(ada);
        let grace = continued_identity(grace);
        assert_eq!(ada.subject(), Some("ada"));
        assert_eq!(grace.subject(), Some("grace"));
        assert_eq!(ada.claim("sub"), Some(&Value::from("ada")));
    }

    #[tokio::test]
    async fn refusal_attaches_nothing() {
        let guard = BearerAuth::new(TokenVerifier::new("secret"));
        let request = http::Request::builder().uri("/album").body(Body::empty()).unwrap();

        match guard.before(request).await {
            PipelineOutcome::ShortCircuit(response) => {
                assert_eq!(response.status(), http::StatusCode::UNAUTHORIZED);
                assert!(response.extensions().get::<Identity>().is_none());
            }
            PipelineOutcome::Continue(..) => panic!("request without a token was let through"),
        }
    }
}
