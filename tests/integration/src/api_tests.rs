//! API endpoint integration tests
//!
//! Tests for the HTTP surface: health, models, messages relay, key
//! self-service and error bodies.

use crate::fixtures::*;
use crate::helpers::*;
use crate::mock_upstream::*;
use gateway_core::{ClientRestrictions, KeyStatus};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;

/// Test the health check endpoint
#[tokio::test]
async fn test_health_endpoint() {
    let upstream = MockAnthropic::new().await;
    let server = TestGateway::new(&upstream.url()).start().await;

    let response = server.get("/health").await;
    assert_status(&response, 200);

    let body = TestServer::json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"]["status"], "healthy");
    assert_eq!(body["cache"]["status"], "healthy");
}

/// Test the model catalog needs no credentials
#[tokio::test]
async fn test_models_endpoint() {
    let upstream = MockAnthropic::new().await;
    let server = TestGateway::new(&upstream.url()).start().await;

    let response = server.get("/v1/models").await;
    assert_status(&response, 200);

    let body = TestServer::json_body(response).await;
    assert_eq!(body["object"], "list");
    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|m| m["id"].as_str())
        .collect();
    assert!(ids.contains(&TEST_MODEL));
}

/// Test a buffered relay returns the upstream body unchanged
#[tokio::test]
async fn test_messages_relay() {
    let upstream = MockAnthropic::new().await;
    upstream.mock_message("Hello there", 12, 7).await;

    let server = TestGateway::new(&upstream.url())
        .with_key(test_tenant_key())
        .with_account(test_account("a1"))
        .start()
        .await;

    let request = messages_request("Hi");
    let response = server.send_message(&request).await;
    assert_status(&response, 200);
    assert!(response.headers().contains_key("x-request-id"));

    let body = TestServer::json_body(response).await;
    assert_eq!(body["content"][0]["text"], "Hello there");
    assert_eq!(body["usage"], json!({"input_tokens": 12, "output_tokens": 7}));

    // Request body forwarded unmodified
    assert_eq!(upstream.received_bodies().await, vec![request]);
    assert_eq!(upstream.calls_for("sk-ant-a1").await, 1);
}

/// Test the legacy path prefix reaches the same pipeline
#[tokio::test]
async fn test_claude_prefixed_route() {
    let upstream = MockAnthropic::new().await;
    upstream.mock_message("prefixed", 1, 1).await;

    let server = TestGateway::new(&upstream.url())
        .with_key(test_tenant_key())
        .with_account(test_account("a1"))
        .start()
        .await;

    let response = server
        .post_json_with_headers(
            "/claude/v1/messages",
            &messages_request("Hi"),
            vec![("authorization", &format!("Bearer {TEST_API_KEY}"))],
        )
        .await;
    assert_status(&response, 200);
}

/// Test missing and unknown credentials
#[tokio::test]
async fn test_unauthenticated_requests() {
    let upstream = MockAnthropic::new().await;
    let server = TestGateway::new(&upstream.url())
        .with_key(test_tenant_key())
        .with_account(test_account("a1"))
        .start()
        .await;

    let response = server
        .post_json_with_headers("/v1/messages", &messages_request("Hi"), vec![])
        .await;
    assert_status(&response, 401);
    let body = TestServer::json_body(response).await;
    assert_eq!(body["error"], "unauthorized");

    let response = server
        .post_json_with_headers(
            "/v1/messages",
            &messages_request("Hi"),
            vec![("x-api-key", "sk-relay-unknown")],
        )
        .await;
    assert_status(&response, 401);
    assert_eq!(upstream.calls().await, 0);
}

/// Test disabled keys are refused
#[tokio::test]
async fn test_disabled_key() {
    let upstream = MockAnthropic::new().await;
    let server = TestGateway::new(&upstream.url())
        .with_key(test_tenant_key().with_status(KeyStatus::Disabled))
        .with_account(test_account("a1"))
        .start()
        .await;

    let response = server.send_message(&messages_request("Hi")).await;
    assert_status(&response, 401);
}

/// Test client restrictions match the User-Agent
#[tokio::test]
async fn test_client_restriction() {
    let upstream = MockAnthropic::new().await;
    upstream.mock_message("ok", 1, 1).await;

    let server = TestGateway::new(&upstream.url())
        .with_key(
            test_tenant_key().with_client_restrictions(ClientRestrictions::allow(["claude_code"])),
        )
        .with_account(test_account("a1"))
        .start()
        .await;

    let response = server
        .post_json_with_headers(
            "/v1/messages",
            &messages_request("Hi"),
            vec![("x-api-key", TEST_API_KEY), ("user-agent", "curl/8.4.0")],
        )
        .await;
    assert_status(&response, 403);

    let response = server
        .post_json_with_headers(
            "/v1/messages",
            &messages_request("Hi"),
            vec![
                ("x-api-key", TEST_API_KEY),
                ("user-agent", "claude-cli/1.0.44 (external, cli)"),
            ],
        )
        .await;
    assert_status(&response, 200);
}

/// Test malformed bodies never reach the upstream
#[tokio::test]
async fn test_malformed_body() {
    let upstream = MockAnthropic::new().await;
    let server = TestGateway::new(&upstream.url())
        .with_key(test_tenant_key())
        .with_account(test_account("a1"))
        .start()
        .await;

    let response = server
        .client
        .post(server.url("/v1/messages"))
        .header("x-api-key", TEST_API_KEY)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_status(&response, 400);
    let body = TestServer::json_body(response).await;
    assert_eq!(body["error"], "bad_request");
    assert_eq!(upstream.calls().await, 0);
}

/// Test key info and usage statistics after a metered call
#[tokio::test]
async fn test_key_info_and_usage_stats() {
    let upstream = MockAnthropic::new().await;
    upstream.mock_message("metered", 1_000, 500).await;

    let server = TestGateway::new(&upstream.url())
        .with_key(test_tenant_key())
        .with_account(test_account("a1"))
        .start()
        .await;

    let response = server.send_message(&messages_request("Hi")).await;
    assert_status(&response, 200);

    let store = server.store.clone();
    assert!(wait_for(|| async { store.usage_count() == 1 }, Duration::from_secs(2)).await);

    let response = server.get_authenticated("/api/key/info").await;
    assert_status(&response, 200);
    let info = TestServer::json_body(response).await;
    assert_eq!(info["id"], "key-1");
    assert_eq!(info["current_usage"]["minute"]["requests"], 1);
    assert!(info.get("key_digest").is_none());

    let response = server.get_authenticated("/api/usage/stats").await;
    assert_status(&response, 200);
    let stats = TestServer::json_body(response).await;
    assert_eq!(stats["summary"]["total_requests"], 1);
    assert_eq!(stats["summary"]["total_input_tokens"], 1_000);
    assert_eq!(stats["summary"]["total_output_tokens"], 500);
    assert_eq!(stats["records"][0]["account_id"], "a1");
    assert_eq!(stats["records"][0]["model"], TEST_MODEL);
    // 1000 × 0.25 / 1e6 + 500 × 1.25 / 1e6
    let cost = stats["records"][0]["cost"].as_f64().unwrap();
    assert!((cost - 0.000_875).abs() < 1e-12);
}

/// Test upstream errors keep their status and body
#[tokio::test]
async fn test_upstream_error_passthrough() {
    let upstream = MockAnthropic::new().await;
    upstream.mock_error(400, "invalid_request_error").await;

    let server = TestGateway::new(&upstream.url())
        .with_key(test_tenant_key())
        .with_account(test_account("a1"))
        .start()
        .await;

    let response = server.send_message(&messages_request("Hi")).await;
    assert_status(&response, 400);
    let body = TestServer::json_body(response).await;
    assert_eq!(body["error"], "upstream_error");
    assert_eq!(body["upstream_status"], 400);
    assert_eq!(body["details"]["error"]["type"], "invalid_request_error");
}
