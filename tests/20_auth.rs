mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use album_api_rust::auth::issue_token;

#[tokio::test]
async fn mutating_without_a_token_is_401() {
    let app = common::spawn_app().await;

    let reply = common::send(
        &app.router,
        common::request(Method::POST, "/album", None, Some(json!({ "title": "Alps" }))),
    )
    .await;

    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body, json!({ "error": "Token manquant ou mal formé" }));
    assert_eq!(app.store.count("albums").await, 0);
}

#[tokio::test]
async fn non_bearer_scheme_is_401() {
    let app = common::spawn_app().await;

    let mut request = common::request(Method::DELETE, "/album/8d0f1f5e-2f1a-4a63-9c1e-6f1f4b1c2d3e", None, None);
    request
        .headers_mut()
        .insert("authorization", "Basic dXNlcjpwYXNz".parse().unwrap());
    let reply = common::send(&app.router, request).await;

    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_signature_is_403() {
    let app = common::spawn_app().await;
    let mut claims = serde_json::Map::new();
    claims.insert("sub".to_string(), json!("mallory"));
    let forged = issue_token(&claims, "some-other-secret").unwrap();

    let reply = common::send(
        &app.router,
        common::request(Method::POST, "/user", Some(&forged), Some(json!({ "lastname": "X" }))),
    )
    .await;

    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(reply.body, json!({ "error": "Token invalide" }));
    assert_eq!(app.store.count("users").await, 0);
}

#[tokio::test]
async fn garbage_token_is_403() {
    let app = common::spawn_app().await;

    let reply = common::send(
        &app.router,
        common::request(Method::PUT, "/album/8d0f1f5e-2f1a-4a63-9c1e-6f1f4b1c2d3e", Some("not.a.jwt"), None),
    )
    .await;

    assert_eq!(reply.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn reads_are_public_and_writes_accept_valid_tokens() {
    let app = common::spawn_app().await;

    let reply = common::send(&app.router, common::request(Method::GET, "/albums", None, None)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, json!([]));

    let token = common::token("alice");
    let reply = common::send(
        &app.router,
        common::request(Method::POST, "/album", Some(&token), Some(json!({ "title": "Alps" }))),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["title"], "Alps");
}

#[tokio::test]
async fn each_request_is_checked_on_its_own() {
    let app = common::spawn_app().await;
    let token = common::token("alice");

    let ok = common::send(
        &app.router,
        common::request(Method::POST, "/user", Some(&token), Some(json!({ "lastname": "A" }))),
    )
    .await;
    let refused = common::send(
        &app.router,
        common::request(Method::POST, "/user", None, Some(json!({ "lastname": "B" }))),
    )
    .await;

    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(refused.status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.store.count("users").await, 1);
}
