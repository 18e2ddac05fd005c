use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    extract::{FromRequestParts, Request},
    http::{header, request::Parts},
    response::IntoResponse,
};
use serde_json::{Map, Value};

use super::{PipelineOutcome, PipelineStage};
use crate::error::ApiError;

/// Decoded request body, stored in the request extensions.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedBody {
    /// No body, or a content type this stage does not decode.
    Empty,
    Json(Value),
    Form(Map<String, Value>),
    /// Decoding failed; handlers turn this into a 400.
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Json,
    Form,
}

/// Decodes JSON and URL-encoded bodies up to `limit` bytes.
pub struct BodyParser {
    limit: usize,
}

impl BodyParser {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    fn kind(parts: &Parts) -> Option<BodyKind> {
        let content_type = parts.headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
        let mime = content_type.split(';').next()?.trim().to_ascii_lowercase();
        if mime == "application/json" || mime.ends_with("+json") {
            Some(BodyKind::Json)
        } else if mime == "application/x-www-form-urlencoded" {
            Some(BodyKind::Form)
        } else {
            None
        }
    }

    fn decode(kind: BodyKind, bytes: &[u8]) -> ParsedBody {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return ParsedBody::Empty;
        }
        match kind {
            BodyKind::Json => match serde_json::from_slice::<Value>(bytes) {
                Ok(value) => ParsedBody::Json(value),
                Err(e) => ParsedBody::Malformed(e.to_string()),
            },
            BodyKind::Form => ParsedBody::Form(decode_form(bytes)),
        }
    }
}

/// Decode `a=1&b=2`; repeated keys collect into an array.
fn decode_form(bytes: &[u8]) -> Map<String, Value> {
    let mut fields = Map::new();
    for (key, value) in url::form_urlencoded::parse(bytes) {
        let value = Value::String(value.into_owned());
        match fields.get_mut(&*key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                fields.insert(key.into_owned(), value);
            }
        }
    }
    fields
}

#[async_trait]
impl PipelineStage for BodyParser {
    type Ticket = ();

    async fn before(&self, request: Request) -> PipelineOutcome {
        let (mut parts, body) = request.into_parts();

        let Some(kind) = Self::kind(&parts) else {
            parts.extensions.insert(ParsedBody::Empty);
            return PipelineOutcome::Continue(Request::from_parts(parts, body), ());
        };

        let bytes = match to_bytes(body, self.limit).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Rejected request body on {} {}: {}", parts.method, parts.uri.path(), e);
                return PipelineOutcome::ShortCircuit(ApiError::PayloadTooLarge.into_response());
            }
        };

        let parsed = Self::decode(kind, &bytes);
        if let ParsedBody::Malformed(reason) = &parsed {
            tracing::debug!("Malformed body on {} {}: {}", parts.method, parts.uri.path(), reason);
        }
        parts.extensions.insert(parsed);
        PipelineOutcome::Continue(Request::from_parts(parts, Body::from(bytes)), ())
    }
}

/// A record-shaped payload: the decoded body as a JSON object.
///
/// An absent body yields an empty object; anything that is not an object,
/// or failed to decode, is a bad request.
#[derive(Debug, Clone, Default)]
pub struct Payload(pub Map<String, Value>);

#[async_trait]
impl<S> FromRequestParts<S> for Payload
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<ParsedBody>() {
            None | Some(ParsedBody::Empty) => Ok(Payload::default()),
            Some(ParsedBody::Json(Value::Object(map))) => Ok(Payload(map.clone())),
            Some(ParsedBody::Form(map)) => Ok(Payload(map.clone())),
            Some(ParsedBody::Json(_)) | Some(ParsedBody::Malformed(_)) => Err(ApiError::bad_request()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http;
    use serde_json::json;

    #[test]
    fn decodes_json_and_forms() {
        assert_eq!(
            BodyParser::decode(BodyKind::Json, br#"{"title":"Alps"}"#),
            ParsedBody::Json(json!({ "title": "Alps" }))
        );
        assert_eq!(BodyParser::decode(BodyKind::Json, b"  \n"), ParsedBody::Empty);
        assert!(matches!(BodyParser::decode(BodyKind::Json, b"{oops"), ParsedBody::Malformed(_)));

        let ParsedBody::Form(fields) = BodyParser::decode(BodyKind::Form, b"title=Alps+2024&tag=a&tag=b") else {
            panic!("expected form");
        };
        assert_eq!(fields["title"], "Alps 2024");
        assert_eq!(fields["tag"], json!(["a", "b"]));
    }

    #[test]
    fn recognizes_content_types() {
        let request = http::Request::builder()
            .header(header::CONTENT_TYPE, "application/json; charset=utf-8")
            .body(Body::empty())
            .unwrap();
        let (parts, _) = request.into_parts();
        assert_eq!(BodyParser::kind(&parts), Some(BodyKind::Json));

        let request = http::Request::builder()
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::empty())
            .unwrap();
        let (parts, _) = request.into_parts();
        assert_eq!(BodyParser::kind(&parts), None);
    }

    #[tokio::test]
    async fn oversized_bodies_short_circuit() {
        let request = http::Request::builder()
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(vec![b' '; 64]))
            .unwrap();

        match BodyParser::new(16).before(request).await {
            PipelineOutcome::ShortCircuit(response) => assert_eq!(response.status(), 413),
            PipelineOutcome::Continue(..) => panic!("expected short-circuit"),
        }
    }
}
