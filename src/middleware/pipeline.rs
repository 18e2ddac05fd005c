use axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    Router,
};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
};

use super::{dispatch, BodyParser, RateLimitConfig, RateLimiter, RequestLog, SecurityHeaders};
use crate::config::RuntimeConfig;

/// One entry of the global request pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    SecurityHeaders,
    RateLimit,
    Compression,
    Cors,
    BodyParser,
    RequestLog,
}

/// The ordered list of global stages. The first stage sees the request
/// first and the response last.
pub struct Pipeline {
    stages: Vec<StageKind>,
    limiter: Arc<RateLimiter>,
    allowed_origins: Vec<String>,
    body_limit: usize,
}

impl Pipeline {
    /// Start a pipeline with the protective stages: security headers, then
    /// rate limiting.
    pub fn secure(config: &RuntimeConfig) -> Self {
        Self {
            stages: vec![StageKind::SecurityHeaders, StageKind::RateLimit],
            limiter: Arc::new(RateLimiter::new(RateLimitConfig::from(config))),
            allowed_origins: config.security.cors_origins.clone(),
            body_limit: config.api.max_request_size_bytes,
        }
    }

    /// Append compression, cross-origin policy, body parsing and, in
    /// development, request logging.
    pub fn extend(mut self, config: &RuntimeConfig) -> Self {
        if config.api.enable_response_compression {
            self.stages.push(StageKind::Compression);
        }
        self.stages.push(StageKind::Cors);
        self.stages.push(StageKind::BodyParser);
        if config.is_development() && config.api.enable_request_logging {
            self.stages.push(StageKind::RequestLog);
        }
        self
    }

    pub fn stages(&self) -> &[StageKind] {
        &self.stages
    }

    pub fn limiter(&self) -> Arc<RateLimiter> {
        self.limiter.clone()
    }

    /// Wrap `router` so that stages run in list order.
    pub fn apply(&self, router: Router) -> Router {
        self.stages
            .iter()
            .rev()
            .fold(router, |router, stage| self.layer(router, *stage))
    }

    fn layer(&self, router: Router, stage: StageKind) -> Router {
        match stage {
            StageKind::SecurityHeaders => {
                router.layer(from_fn_with_state(Arc::new(SecurityHeaders), dispatch::<SecurityHeaders>))
            }
            StageKind::RateLimit => router.layer(from_fn_with_state(self.limiter.clone(), dispatch::<RateLimiter>)),
            StageKind::Compression => router.layer(CompressionLayer::new()),
            StageKind::Cors => router.layer(self.cors()),
            StageKind::BodyParser => router.layer(from_fn_with_state(
                Arc::new(BodyParser::new(self.body_limit)),
                dispatch::<BodyParser>,
            )),
            StageKind::RequestLog => router.layer(from_fn_with_state(Arc::new(RequestLog), dispatch::<RequestLog>)),
        }
    }

    fn cors(&self) -> CorsLayer {
        let origin = if self.allowed_origins.is_empty() || self.allowed_origins.iter().any(|o| o == "*") {
            AllowOrigin::any()
        } else {
            let origins: Vec<HeaderValue> = self
                .allowed_origins
                .iter()
                .filter_map(|o| match HeaderValue::from_str(o) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!("Ignoring invalid allowed origin '{}'", o);
                        None
                    }
                })
                .collect();
            AllowOrigin::list(origins)
        };

        CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    }
}
