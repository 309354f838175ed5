//! Anthropic Messages API relay.
//!
//! The caller's body is forwarded byte for byte. Buffered responses are
//! parsed once to lift out usage; streamed responses are pumped through a
//! bounded channel by a producer task so the caller side only ever sees
//! upstream chunks in order, plus at most one terminal error chunk.

use bytes::Bytes;
use dashmap::DashMap;
use futures_util::StreamExt;
use gateway_core::{MessagesRequest, TokenUsage, UpstreamAccount};
use reqwest::{Client, Proxy, Response};
use secrecy::ExposeSecret;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::error::RelayError;
use crate::sse::{interrupted_chunk, UsageTracker};

/// Default `anthropic-version` header
pub const DEFAULT_API_VERSION: &str = "2023-06-01";

/// Relay settings
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Upstream base URL without the `/v1/messages` suffix
    pub base_url: String,
    /// `anthropic-version` header value
    pub api_version: String,
    /// Optional `anthropic-beta` header value
    pub beta_header: Option<String>,
    /// Total timeout for buffered calls
    pub timeout: Duration,
    /// Connect timeout for every call
    pub connect_timeout: Duration,
    /// Chunks buffered between the producer and the caller
    pub stream_buffer: usize,
    /// Outbound `user-agent`
    pub user_agent: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            beta_header: None,
            timeout: Duration::from_secs(600),
            connect_timeout: Duration::from_secs(10),
            stream_buffer: 32,
            user_agent: concat!("relay-gateway/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl RelayConfig {
    /// Create a config for the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Set the API version header
    #[must_use]
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Set the beta header
    #[must_use]
    pub fn with_beta_header(mut self, beta: Option<String>) -> Self {
        self.beta_header = beta;
        self
    }

    /// Set the buffered-call timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the connect timeout
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the stream channel capacity
    #[must_use]
    pub fn with_stream_buffer(mut self, capacity: usize) -> Self {
        self.stream_buffer = capacity.max(1);
        self
    }

    /// Messages endpoint URL
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }
}

/// Buffered upstream reply
#[derive(Debug, Clone)]
pub struct BufferedResponse {
    /// Upstream status (always 2xx)
    pub status: u16,
    /// Parsed body
    pub body: Value,
    /// Usage reported in the body
    pub usage: Option<TokenUsage>,
}

/// How a relayed stream ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Upstream finished; usage if any usage event passed through
    Completed(Option<TokenUsage>),
    /// Upstream failed midway; a terminal error chunk was sent
    Interrupted(String),
    /// Caller went away before the upstream finished
    Cancelled,
}

/// Streamed upstream reply
#[derive(Debug)]
pub struct RelayStream {
    /// Upstream status (always 2xx)
    pub status: u16,
    /// Upstream `content-type`, if any
    pub content_type: Option<String>,
    /// Chunks in upstream order
    pub chunks: mpsc::Receiver<Bytes>,
    /// Resolves once the producer stops
    pub outcome: oneshot::Receiver<StreamOutcome>,
}

/// Relay to the Anthropic Messages API
#[derive(Debug)]
pub struct AnthropicRelay {
    config: RelayConfig,
    buffered: Client,
    streaming: Client,
    proxied: DashMap<(String, bool), Client>,
}

impl AnthropicRelay {
    /// Create a relay
    ///
    /// # Errors
    /// Returns error if HTTP client cannot be created
    pub fn new(config: RelayConfig) -> Result<Self, RelayError> {
        let buffered = Self::build_client(&config, false, None)?;
        let streaming = Self::build_client(&config, true, None)?;
        Ok(Self {
            config,
            buffered,
            streaming,
            proxied: DashMap::new(),
        })
    }

    /// Relay settings
    #[must_use]
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Number of cached proxy clients
    #[must_use]
    pub fn proxy_client_count(&self) -> usize {
        self.proxied.len()
    }

    fn build_client(
        config: &RelayConfig,
        streaming: bool,
        proxy: Option<&str>,
    ) -> Result<Client, RelayError> {
        let mut builder = Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(100);
        // streams may legitimately run longer than any fixed deadline
        if !streaming {
            builder = builder.timeout(config.timeout);
        }
        if let Some(url) = proxy {
            let proxy = Proxy::all(url)
                .map_err(|e| RelayError::Client(format!("Invalid proxy '{url}': {e}")))?;
            builder = builder.proxy(proxy);
        }
        builder
            .build()
            .map_err(|e| RelayError::Client(e.to_string()))
    }

    fn client_for(&self, account: &UpstreamAccount, streaming: bool) -> Result<Client, RelayError> {
        let Some(url) = account.proxy_url() else {
            return Ok(if streaming {
                self.streaming.clone()
            } else {
                self.buffered.clone()
            });
        };

        let key = (url.to_string(), streaming);
        if let Some(client) = self.proxied.get(&key) {
            return Ok(client.clone());
        }
        let client = Self::build_client(&self.config, streaming, Some(url))?;
        debug!(account_id = %account.id, "Created proxied upstream client");
        Ok(self.proxied.entry(key).or_insert(client).clone())
    }

    /// `Authorization` value for a stored credential
    #[must_use]
    pub fn authorization_value(credential: &str) -> String {
        if credential.starts_with("Bearer ") {
            credential.to_string()
        } else {
            format!("Bearer {credential}")
        }
    }

    async fn send(
        &self,
        account: &UpstreamAccount,
        request: &MessagesRequest,
    ) -> Result<Response, RelayError> {
        let streaming = request.is_stream();
        let client = self.client_for(account, streaming)?;

        let mut builder = client
            .post(self.config.endpoint())
            .header(
                "authorization",
                Self::authorization_value(account.credential.expose_secret()),
            )
            .header("anthropic-version", &self.config.api_version)
            .header("content-type", "application/json")
            .header("user-agent", &self.config.user_agent)
            .body(request.body().clone());
        if let Some(beta) = &self.config.beta_header {
            builder = builder.header("anthropic-beta", beta);
        }

        debug!(
            account_id = %account.id,
            model = request.model().unwrap_or("unknown"),
            stream = streaming,
            "Relaying request upstream"
        );

        let response = builder.send().await.map_err(|e| {
            error!(account_id = %account.id, error = %e, "Upstream request failed");
            RelayError::from(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(account_id = %account.id, status = status.as_u16(), "Upstream returned error");
            return Err(RelayError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Relay and wait for the full response
    pub async fn relay_buffered(
        &self,
        account: &UpstreamAccount,
        request: &MessagesRequest,
    ) -> Result<BufferedResponse, RelayError> {
        let response = self.send(account, request).await?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await?;
        let body: Value = serde_json::from_slice(&bytes)
            .map_err(|e| RelayError::InvalidResponse(e.to_string()))?;
        let usage = TokenUsage::from_response(&body);

        Ok(BufferedResponse {
            status,
            body,
            usage,
        })
    }

    /// Relay and hand back a channel of upstream chunks
    pub async fn relay_stream(
        &self,
        account: &UpstreamAccount,
        request: &MessagesRequest,
    ) -> Result<RelayStream, RelayError> {
        let response = self.send(account, request).await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let (tx, chunks) = mpsc::channel(self.config.stream_buffer.max(1));
        let (outcome_tx, outcome) = oneshot::channel();
        let account_id = account.id.clone();

        tokio::spawn(async move {
            let result = pump(response, tx).await;
            match &result {
                StreamOutcome::Completed(usage) => {
                    debug!(account_id = %account_id, ?usage, "Upstream stream completed");
                }
                StreamOutcome::Interrupted(reason) => {
                    warn!(account_id = %account_id, reason = %reason, "Upstream stream interrupted");
                }
                StreamOutcome::Cancelled => {
                    info!(account_id = %account_id, "Caller disconnected, upstream stream dropped");
                }
            }
            let _ = outcome_tx.send(result);
        });

        Ok(RelayStream {
            status,
            content_type,
            chunks,
            outcome,
        })
    }
}

/// Forward upstream chunks until the upstream ends, fails, or the caller leaves.
///
/// A caller disconnect is noticed even while the upstream is idle.
async fn pump(response: Response, tx: mpsc::Sender<Bytes>) -> StreamOutcome {
    let mut upstream = response.bytes_stream();
    let mut tracker = UsageTracker::new();

    loop {
        let next = tokio::select! {
            () = tx.closed() => return StreamOutcome::Cancelled,
            next = upstream.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                tracker.observe(&chunk);
                if tx.send(chunk).await.is_err() {
                    return StreamOutcome::Cancelled;
                }
            }
            Some(Err(e)) => {
                let reason = e.to_string();
                let _ = tx
                    .send(interrupted_chunk(&reason, tracker.is_mid_event()))
                    .await;
                return StreamOutcome::Interrupted(reason);
            }
            None => return StreamOutcome::Completed(tracker.usage()),
        }
    }
}
