#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Map, Value};
use tower::ServiceExt;

use album_api_rust::auth::issue_token;
use album_api_rust::config::{Environment, RuntimeConfig};
use album_api_rust::database::{MemoryStore, StoreConnector};
use album_api_rust::server::Service;

pub const SECRET: &str = "integration-test-secret";

/// A fully started service over an in-memory store.
pub struct TestApp {
    pub router: Router,
    pub service: Service,
    pub store: Arc<MemoryStore>,
}

pub fn config() -> RuntimeConfig {
    let mut config = RuntimeConfig::preset(Environment::Development);
    config.data_store_uri = "memory://".to_string();
    config.security.jwt_secret = Some(SECRET.to_string());
    config.database.probe_interval_secs = 0;
    config.api.enable_request_logging = false;
    config
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(config()).await
}

pub async fn spawn_app_with(config: RuntimeConfig) -> TestApp {
    let connector = Arc::new(StoreConnector::new(config.database.clone()));
    let store = connector.memory();
    let mut service = Service::with_connector(config, connector);
    let router = service.run().await.expect("service failed to start");
    TestApp { router, service, store }
}

pub fn token(subject: &str) -> String {
    let mut claims = Map::new();
    claims.insert("sub".to_string(), json!(subject));
    issue_token(&claims, SECRET).expect("failed to sign token")
}

pub fn request(method: Method, uri: &str, bearer: Option<&str>, body: Option<Value>) -> Request<Body> {
    request_from(([127, 0, 0, 1], 40000).into(), method, uri, bearer, body)
}

/// Build a request as if it arrived from `client`.
pub fn request_from(
    client: SocketAddr,
    method: Method,
    uri: &str,
    bearer: Option<&str>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let mut request = builder.body(body).expect("invalid test request");
    request.extensions_mut().insert(ConnectInfo(client));
    request
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub async fn send(router: &Router, request: Request<Body>) -> Reply {
    let response = router.clone().oneshot(request).await.expect("router is infallible");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("failed to read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    Reply { status, headers, body }
}

/// A router served on a real socket.
pub struct TestServer {
    pub port: u16,
    pub base_url: String,
}

impl TestServer {
    pub async fn spawn(router: Router) -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .with_context(|| format!("failed to bind port {}", port))?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>()).await;
        });

        Ok(Self { port, base_url })
    }
}
