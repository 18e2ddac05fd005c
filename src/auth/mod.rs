use axum::http::HeaderValue;
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::config::{Environment, RuntimeConfig};

/// Secret used in development when `JWT_SECRET` is not set.
pub const DEVELOPMENT_FALLBACK_SECRET: &str = "album-api-development-secret";

/// Claims of a verified bearer token, attached to the request that carried it.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity(pub Map<String, Value>);

impl Identity {
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn subject(&self) -> Option<&str> {
        self.claim("sub").and_then(Value::as_str)
    }
}

/// Why a bearer credential was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthFault {
    /// No header, or not `Bearer <token>`.
    MissingOrMalformed,
    /// Signature, expiry or encoding check failed.
    Invalid,
    /// The verifier itself could not run.
    Internal(String),
}

impl AuthFault {
    pub fn status_code(&self) -> u16 {
        match self {
            AuthFault::MissingOrMalformed => 401,
            AuthFault::Invalid => 403,
            AuthFault::Internal(_) => 500,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            AuthFault::MissingOrMalformed => "Token manquant ou mal formé",
            AuthFault::Invalid => "Token invalide",
            AuthFault::Internal(_) => "Erreur interne",
        }
    }
}

impl std::fmt::Display for AuthFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthFault::Internal(detail) => write!(f, "{}: {}", self.message(), detail),
            _ => f.write_str(self.message()),
        }
    }
}

impl std::error::Error for AuthFault {}

/// The configured secret, or the development fallback. `None` outside
/// development when no secret is configured.
pub fn resolve_secret(config: &RuntimeConfig) -> Option<String> {
    match (&config.security.jwt_secret, config.environment) {
        (Some(secret), _) => Some(secret.clone()),
        (None, Environment::Development) => {
            tracing::warn!("JWT_SECRET not set; using the development fallback secret");
            Some(DEVELOPMENT_FALLBACK_SECRET.to_string())
        }
        (None, _) => None,
    }
}

/// Stateless HS256 bearer-token verifier. Cheap to clone.
#[derive(Clone)]
pub struct TokenVerifier {
    key: Arc<DecodingKey>,
    validation: Arc<Validation>,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::default();
        // `exp` is checked when present but not required; `aud` is not checked.
        validation.required_spec_claims.clear();
        validation.validate_aud = false;

        Self {
            key: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
            validation: Arc::new(validation),
        }
    }

    /// Validate an `Authorization` header value and return its claims.
    pub fn verify(&self, header: Option<&HeaderValue>) -> Result<Identity, AuthFault> {
        let token = extract_bearer(header)?;

        decode::<Map<String, Value>>(token, &self.key, &self.validation)
            .map(|data| Identity(data.claims))
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidKeyFormat
                | ErrorKind::InvalidRsaKey(_)
                | ErrorKind::InvalidEcdsaKey
                | ErrorKind::MissingAlgorithm
                | ErrorKind::Crypto(_) => AuthFault::Internal(e.to_string()),
                _ => {
                    tracing::debug!("Rejected bearer token: {}", e);
                    AuthFault::Invalid
                }
            })
    }
}

/// Extract `<token>` from `Bearer <token>`.
fn extract_bearer(header: Option<&HeaderValue>) -> Result<&str, AuthFault> {
    let value = header
        .ok_or(AuthFault::MissingOrMalformed)?
        .to_str()
        .map_err(|_| AuthFault::MissingOrMalformed)?;

    match value.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim()),
        _ => Err(AuthFault::MissingOrMalformed),
    }
}

/// Sign `claims` with HS256. Used by tooling and tests to mint tokens.
pub fn issue_token(claims: &Map<String, Value>, secret: &str) -> Result<String, AuthFault> {
    encode(&Header::default(), claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| AuthFault::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn bearer(token: &str) -> HeaderValue {
        HeaderValue::from_str(&format!("Bearer {}", token)).unwrap()
    }

    #[test]
    fn accepts_valid_token() {
        let verifier = TokenVerifier::new("secret");
        let token = issue_token(&claims(json!({ "sub": "ada" })), "secret").unwrap();

        let identity = verifier.verify(Some(&bearer(&token))).unwrap();
        assert_eq!(identity.subject(), Some("ada"));
    }

    #[test]
    fn audience_claim_is_not_checked() {
        let verifier = TokenVerifier::new("secret");
        let token = issue_token(&claims(json!({ "sub": "ada", "aud": "albums-frontend" })), "secret").unwrap();

        let identity = verifier.verify(Some(&bearer(&token))).unwrap();
        assert_eq!(identity.subject(), Some("ada"));
        assert_eq!(identity.claim("aud"), Some(&json!("albums-frontend")));
    }

    #[test]
    fn missing_or_malformed_header() {
        let verifier = TokenVerifier::new("secret");
        assert_eq!(verifier.verify(None), Err(AuthFault::MissingOrMalformed));
        assert_eq!(
            verifier.verify(Some(&HeaderValue::from_static("Basic abc"))),
            Err(AuthFault::MissingOrMalformed)
        );
        assert_eq!(
            verifier.verify(Some(&HeaderValue::from_static("Bearer "))),
            Err(AuthFault::MissingOrMalformed)
        );
        assert_eq!(
            verifier.verify(Some(&HeaderValue::from_static("bearer abc"))),
            Err(AuthFault::MissingOrMalformed)
        );
    }

    #[test]
    fn wrong_signature_is_invalid() {
        let verifier = TokenVerifier::new("secret");
        let token = issue_token(&claims(json!({ "sub": "mallory" })), "other-secret").unwrap();
        assert_eq!(verifier.verify(Some(&bearer(&token))), Err(AuthFault::Invalid));
        assert_eq!(verifier.verify(Some(&bearer("not.a.jwt"))), Err(AuthFault::Invalid));
    }

    #[test]
    fn expired_token_is_invalid() {
        let verifier = TokenVerifier::new("secret");
        let past = chrono::Utc::now().timestamp() - 3600;
        let token = issue_token(&claims(json!({ "sub": "ada", "exp": past })), "secret").unwrap();
        assert_eq!(verifier.verify(Some(&bearer(&token))), Err(AuthFault::Invalid));
    }

    #[test]
    fn secret_resolution_by_environment() {
        let dev = RuntimeConfig::preset(Environment::Development);
        assert_eq!(resolve_secret(&dev).as_deref(), Some(DEVELOPMENT_FALLBACK_SECRET));

        let mut prod = RuntimeConfig::preset(Environment::Production);
        assert_eq!(resolve_secret(&prod), None);

        prod.security.jwt_secret = Some("configured".into());
        assert_eq!(resolve_secret(&prod).as_deref(), Some("configured"));
    }
}
