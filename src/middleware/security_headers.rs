use async_trait::async_trait;
use axum::{
    extract::Request,
    http::{header, HeaderName, HeaderValue},
    response::Response,
};

use super::{PipelineOutcome, PipelineStage};

/// Standard hardening header set applied to every response.
const HARDENING_HEADERS: &[(&str, &str)] = &[
    (
        "content-security-policy",
        "default-src 'self';base-uri 'self';font-src 'self' https: data:;form-action 'self';\
         frame-ancestors 'self';img-src 'self' data:;object-src 'none';script-src 'self';\
         script-src-attr 'none';style-src 'self' https: 'unsafe-inline';upgrade-insecure-requests",
    ),
    ("cross-origin-opener-policy", "same-origin"),
    ("cross-origin-resource-policy", "same-origin"),
    ("origin-agent-cluster", "?1"),
    ("referrer-policy", "no-referrer"),
    ("strict-transport-security", "max-age=15552000; includeSubDomains"),
    ("x-content-type-options", "nosniff"),
    ("x-dns-prefetch-control", "off"),
    ("x-download-options", "noopen"),
    ("x-frame-options", "SAMEORIGIN"),
    ("x-permitted-cross-domain-policies", "none"),
    ("x-xss-protection", "0"),
];

/// Headers that identify the server technology.
const REVEALING_HEADERS: &[&str] = &["x-powered-by"];

pub struct SecurityHeaders;

#[async_trait]
impl PipelineStage for SecurityHeaders {
    type Ticket = ();

    async fn before(&self, request: Request) -> PipelineOutcome {
        PipelineOutcome::Continue(request, ())
    }

    fn after(&self, _ticket: (), response: &mut Response) {
        let headers = response.headers_mut();
        for &(name, value) in HARDENING_HEADERS {
            headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
        }
        for &name in REVEALING_HEADERS {
            headers.remove(name);
        }
        headers.remove(header::SERVER);
    }
}
