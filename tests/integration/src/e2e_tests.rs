//! End-to-end streaming tests over real sockets

use crate::fixtures::*;
use crate::helpers::*;
use crate::mock_upstream::*;
use gateway_core::{CredentialStore, UsageFilter};
use pretty_assertions::assert_eq;
use std::time::Duration;

/// Test event order and bytes survive the relay
#[tokio::test]
async fn test_stream_order_preserved() {
    let upstream = MockAnthropic::new().await;
    let events = sse_events(&["P1", "P2", "P3", "P4"], 30, 9);
    upstream.mock_stream(&events).await;

    let server = TestGateway::new(&upstream.url())
        .with_key(test_tenant_key())
        .with_account(test_account("a1"))
        .start()
        .await;

    let (status, chunks) = server
        .send_streaming(&streaming_messages_request("count"))
        .await;
    assert_eq!(status, 200);
    assert_eq!(chunks.concat(), events.concat());

    let received = chunks.concat();
    let positions: Vec<usize> = ["P1", "P2", "P3", "P4"]
        .iter()
        .map(|p| received.find(&format!("\"text\":\"{p}\"")).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
}

/// Test usage carried by stream events is metered
#[tokio::test]
async fn test_stream_usage_metered() {
    let upstream = MockAnthropic::new().await;
    upstream
        .mock_stream(&sse_events(&["hello"], 120, 45))
        .await;

    let server = TestGateway::new(&upstream.url())
        .with_key(test_tenant_key())
        .with_account(test_account("a1"))
        .start()
        .await;

    let (status, _) = server
        .send_streaming(&streaming_messages_request("meter me"))
        .await;
    assert_eq!(status, 200);

    let store = server.store.clone();
    assert!(wait_for(|| async { store.usage_count() == 1 }, Duration::from_secs(2)).await);

    let records = server
        .store
        .list_usage_records(&UsageFilter::default())
        .await
        .unwrap();
    assert_eq!(records[0].input_tokens, 120);
    assert_eq!(records[0].output_tokens, 45);
    assert_eq!(records[0].tenant_key_id, "key-1");
}

/// Test streamed responses carry SSE headers
#[tokio::test]
async fn test_stream_headers() {
    let upstream = MockAnthropic::new().await;
    upstream.mock_stream(&sse_events(&["x"], 1, 1)).await;

    let server = TestGateway::new(&upstream.url())
        .with_key(test_tenant_key())
        .with_account(test_account("a1"))
        .start()
        .await;

    let response = server
        .send_message(&streaming_messages_request("headers"))
        .await;
    assert_status(&response, 200);
    let headers = response.headers();
    assert!(headers["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));
    assert_eq!(headers["cache-control"], "no-cache");
    assert_eq!(headers["x-accel-buffering"], "no");
}

/// Test an upstream error before any byte is a normal error response
#[tokio::test]
async fn test_stream_upstream_error() {
    let upstream = MockAnthropic::new().await;
    upstream.mock_error(529, "overloaded_error").await;

    let server = TestGateway::new(&upstream.url())
        .with_key(test_tenant_key())
        .with_account(test_account("a1"))
        .start()
        .await;

    let response = server
        .send_message(&streaming_messages_request("busy"))
        .await;
    assert_status(&response, 529);
    let body = TestServer::json_body(response).await;
    assert_eq!(body["error"], "upstream_error");
    assert_eq!(server.store.usage_count(), 0);
}
