//! API contract tests for the HTTP surface.
//!
//! These tests exercise the transport contracts that hold regardless of
//! provider behavior: health, input validation, and error codes.

use axum_test::TestServer;
use serde_json::{json, Value};

use ttdr_api::config::AppConfig;
use ttdr_api::server::create_app;

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.provider.api_key = Some("test-key".to_string());
    config
}

fn test_server() -> TestServer {
    let app = create_app(test_config()).expect("app should build");
    TestServer::new(app).expect("test server should start")
}

#[tokio::test]
async fn test_health_returns_ok() {
    let server = test_server();

    let response = server.get("/health").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_evaluate_missing_query_is_bad_request() {
    let server = test_server();

    let response = server.post("/evaluate").json(&json!({"iid": "req-1"})).await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_evaluate_missing_iid_is_bad_request() {
    let server = test_server();

    let response = server
        .post("/evaluate")
        .json(&json!({"query": "What is Rust?"}))
        .await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_evaluate_empty_fields_are_bad_request() {
    let server = test_server();

    let response = server
        .post("/evaluate")
        .json(&json!({"query": "   ", "iid": "req-2"}))
        .await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_run_missing_question_is_bad_request() {
    let server = test_server();

    let response = server.post("/run").json(&json!({})).await;
    response.assert_status_bad_request();

    let response = server.post("/run").json(&json!({"question": ""})).await;
    response.assert_status_bad_request();
}

#[test]
fn test_missing_api_key_fails_startup() {
    let err = create_app(AppConfig::default()).unwrap_err();
    assert!(err.to_string().contains("GEMINI_API_KEY not found"));
}
