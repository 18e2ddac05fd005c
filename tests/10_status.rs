mod common;

use axum::http::{Method, StatusCode};
use chrono::DateTime;

#[tokio::test]
async fn status_reports_online_without_a_token() {
    let app = common::spawn_app().await;

    let reply = common::send(&app.router, common::request(Method::GET, "/status", None, None)).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["status"], "online");
    let stamp = reply.body["timestamp"].as_str().expect("timestamp is a string");
    assert!(DateTime::parse_from_rfc3339(stamp).is_ok(), "not ISO 8601: {}", stamp);
}

#[tokio::test]
async fn repeated_status_timestamps_never_go_backwards() {
    let app = common::spawn_app().await;

    let mut previous = None;
    for _ in 0..5 {
        let reply = common::send(&app.router, common::request(Method::GET, "/status", None, None)).await;
        assert_eq!(reply.status, StatusCode::OK);
        let stamp = DateTime::parse_from_rfc3339(reply.body["timestamp"].as_str().unwrap()).unwrap();
        if let Some(prev) = previous {
            assert!(stamp >= prev);
        }
        previous = Some(stamp);
    }
}

#[tokio::test]
async fn responses_carry_hardening_headers() {
    let app = common::spawn_app().await;

    let reply = common::send(&app.router, common::request(Method::GET, "/status", None, None)).await;

    assert_eq!(reply.headers["x-content-type-options"], "nosniff");
    assert!(reply.headers.contains_key("x-frame-options"));
    assert!(!reply.headers.contains_key("x-powered-by"));
    assert!(reply.headers.contains_key("ratelimit-remaining"));
}

#[tokio::test]
async fn unknown_routes_answer_structured_404() {
    let app = common::spawn_app().await;

    for (method, uri) in [
        (Method::GET, "/nowhere"),
        (Method::POST, "/status"),
        (Method::PATCH, "/user/8d0f1f5e-2f1a-4a63-9c1e-6f1f4b1c2d3e"),
    ] {
        let reply = common::send(&app.router, common::request(method.clone(), uri, None, None)).await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND, "{} {}", method, uri);
        assert_eq!(reply.body, serde_json::json!({ "code": 404, "message": "Not Found" }));
    }
}
