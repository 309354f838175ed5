//! Upstream account selection and failover tests

use crate::fixtures::*;
use crate::helpers::*;
use crate::mock_upstream::*;
use gateway_core::{AccountStatus, CredentialStore};

/// Test an account rejected by the upstream is never selected again
#[tokio::test]
async fn test_revoked_account_dropped_from_pool() {
    let upstream = MockAnthropic::new().await;
    upstream
        .mock_error_for("sk-ant-revoked", 401, "authentication_error")
        .await;
    upstream.mock_message_for("sk-ant-good", "fine").await;

    let server = TestGateway::new(&upstream.url())
        .with_key(test_tenant_key())
        .with_account(test_account("revoked"))
        .with_account(test_account("good"))
        .start()
        .await;

    let mut unauthorized = 0;
    for _ in 0..20 {
        let response = server.send_message(&messages_request("Hi")).await;
        match response.status().as_u16() {
            200 => {}
            401 => unauthorized += 1,
            other => panic!("unexpected status {other}"),
        }
    }

    assert!(unauthorized <= 1);
    assert!(upstream.calls_for("sk-ant-revoked").await <= 1);
    if unauthorized == 1 {
        let account = server.store.get_account_by_id("revoked").await.unwrap().unwrap();
        assert_eq!(account.status, AccountStatus::Invalid);
    }
}

/// Test non-active accounts are never selected
#[tokio::test]
async fn test_only_active_accounts_selected() {
    let upstream = MockAnthropic::new().await;
    upstream.mock_message("ok", 1, 1).await;

    let server = TestGateway::new(&upstream.url())
        .with_key(test_tenant_key())
        .with_account(test_account("parked").with_status(AccountStatus::Inactive))
        .with_account(test_account("broken").with_status(AccountStatus::Invalid))
        .with_account(test_account("live"))
        .start()
        .await;

    for _ in 0..10 {
        assert_status(&server.send_message(&messages_request("Hi")).await, 200);
    }
    assert_eq!(upstream.calls_for("sk-ant-live").await, 10);
    assert_eq!(upstream.calls_for("sk-ant-parked").await, 0);
    assert_eq!(upstream.calls_for("sk-ant-broken").await, 0);
}

/// Test the configured group fences the pool
#[tokio::test]
async fn test_group_filter() {
    let upstream = MockAnthropic::new().await;
    upstream.mock_message("ok", 1, 1).await;

    let server = TestGateway::new(&upstream.url())
        .configure(|config| config.upstream.group = Some("eu".to_string()))
        .with_key(test_tenant_key())
        .with_account(test_account("us-1").with_group("us"))
        .with_account(test_account("eu-1").with_group("eu"))
        .start()
        .await;

    for _ in 0..5 {
        assert_status(&server.send_message(&messages_request("Hi")).await, 200);
    }
    assert_eq!(upstream.calls_for("sk-ant-eu-1").await, 5);
    assert_eq!(upstream.calls_for("sk-ant-us-1").await, 0);
}

/// Test a transport failure counts against the account without demoting it
#[tokio::test]
async fn test_transport_failure() {
    let upstream = MockAnthropic::new().await;

    let server = TestGateway::new(&upstream.url())
        .with_key(test_tenant_key())
        .with_account(test_account("proxied").with_proxy("http://127.0.0.1:9"))
        .start()
        .await;

    let response = server.send_message(&messages_request("Hi")).await;
    assert_status(&response, 502);

    let account = server.store.get_account_by_id("proxied").await.unwrap().unwrap();
    assert_eq!(account.status, AccountStatus::Active);
    assert_eq!(account.error_count, 1);
    assert_eq!(upstream.calls().await, 0);
}

/// Test an empty pool yields 503
#[tokio::test]
async fn test_no_upstream_available() {
    let upstream = MockAnthropic::new().await;

    let server = TestGateway::new(&upstream.url())
        .with_key(test_tenant_key())
        .start()
        .await;

    let response = server.send_message(&messages_request("Hi")).await;
    assert_status(&response, 503);
    let body = TestServer::json_body(response).await;
    assert_eq!(body["error"], "no_upstream_available");
}
