//! Test helper utilities for integration tests

use gateway_config::GatewayConfig;
use gateway_core::{MemoryCredentialStore, TenantKey, UpstreamAccount};
use gateway_server::{AppState, Server, ServerConfig};
use once_cell::sync::Lazy;
use reqwest::{Client, Response};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::fixtures::TEST_API_KEY;

/// Initialize tracing for tests (only once)
static TRACING: Lazy<()> = Lazy::new(|| {
    if std::env::var("TEST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
});

/// Initialize tracing for tests
pub fn init_tracing() {
    Lazy::force(&TRACING);
}

/// Gateway under test, built up before it starts listening
pub struct TestGateway {
    config: GatewayConfig,
    store: Arc<MemoryCredentialStore>,
}

impl TestGateway {
    /// Gateway relaying to `upstream_url`, IP gate disabled
    pub fn new(upstream_url: &str) -> Self {
        let mut config = GatewayConfig::default();
        config.upstream.base_url = upstream_url.to_string();
        config.quota.ip_gate_enabled = false;
        Self {
            config,
            store: Arc::new(MemoryCredentialStore::new()),
        }
    }

    /// Adjust the configuration
    #[must_use]
    pub fn configure(mut self, f: impl FnOnce(&mut GatewayConfig)) -> Self {
        f(&mut self.config);
        self
    }

    /// Seed a tenant key
    #[must_use]
    pub fn with_key(self, key: TenantKey) -> Self {
        self.store.insert_tenant_key(key).expect("valid tenant key");
        self
    }

    /// Seed an upstream account
    #[must_use]
    pub fn with_account(self, account: UpstreamAccount) -> Self {
        self.store.insert_account(account);
        self
    }

    /// Bind an ephemeral port and serve
    pub async fn start(self) -> TestServer {
        init_tracing();

        let state = AppState::builder()
            .config(self.config)
            .store(self.store.clone())
            .build()
            .expect("Failed to build state");

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get local addr");

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let server = Server::new(
            ServerConfig::new().with_shutdown_timeout(Duration::from_secs(1)),
            state,
        );

        // Spawn the server
        tokio::spawn(async move {
            server
                .serve(listener, async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("Server error");
        });

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create client");

        TestServer {
            addr,
            client,
            base_url: format!("http://{addr}"),
            store: self.store,
            shutdown_tx: Some(shutdown_tx),
        }
    }
}

/// Test server wrapper for integration tests
pub struct TestServer {
    /// The server address
    pub addr: SocketAddr,
    /// HTTP client for making requests
    pub client: Client,
    /// Base URL for the server
    pub base_url: String,
    /// Credential store behind the gateway
    pub store: Arc<MemoryCredentialStore>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Get the full URL for a path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Make a GET request
    pub async fn get(&self, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("Request failed")
    }

    /// Make a GET request authenticated with the test key
    pub async fn get_authenticated(&self, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .header("x-api-key", TEST_API_KEY)
            .send()
            .await
            .expect("Request failed")
    }

    /// Make a POST request with JSON body and headers
    pub async fn post_json_with_headers(
        &self,
        path: &str,
        body: &Value,
        headers: Vec<(&str, &str)>,
    ) -> Response {
        let mut builder = self.client.post(self.url(path)).json(body);
        for (key, value) in headers {
            builder = builder.header(key, value);
        }
        builder.send().await.expect("Request failed")
    }

    /// POST a Messages API body with the test key
    pub async fn send_message(&self, body: &Value) -> Response {
        self.post_json_with_headers("/v1/messages", body, vec![("x-api-key", TEST_API_KEY)])
            .await
    }

    /// POST a streamed Messages API body and collect the raw chunks
    pub async fn send_streaming(&self, body: &Value) -> (u16, Vec<String>) {
        use futures::StreamExt;

        let response = self.send_message(body).await;
        let status = response.status().as_u16();

        let mut chunks = Vec::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            if let Ok(bytes) = chunk {
                if let Ok(text) = String::from_utf8(bytes.to_vec()) {
                    chunks.push(text);
                }
            }
        }

        (status, chunks)
    }

    /// Parse response body as JSON
    pub async fn json_body(response: Response) -> Value {
        response.json().await.expect("Failed to parse JSON")
    }

    /// Shutdown the test server
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Assert that a response has the expected status code
pub fn assert_status(response: &Response, expected: u16) {
    assert_eq!(
        response.status().as_u16(),
        expected,
        "Expected status {}, got {}",
        expected,
        response.status()
    );
}

/// Wait for a condition to be true with timeout
pub async fn wait_for<F, Fut>(condition: F, timeout: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::test_tenant_key;

    #[tokio::test]
    async fn test_server_health() {
        let server = TestGateway::new("http://127.0.0.1:9")
            .with_key(test_tenant_key())
            .start()
            .await;

        let response = server.get("/health").await;
        assert_status(&response, 200);

        let json = TestServer::json_body(response).await;
        assert_eq!(json["status"], "healthy");
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        assert!(!wait_for(|| async { false }, Duration::from_millis(60)).await);
        assert!(wait_for(|| async { true }, Duration::from_millis(60)).await);
    }
}
