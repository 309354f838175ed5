//! Mock Anthropic Messages API for integration testing
//!
//! A wiremock server answering `POST /v1/messages`. Mocks can be scoped to
//! one upstream account by its bearer credential.

use serde_json::Value;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockBuilder, MockServer, ResponseTemplate};

use crate::fixtures::{messages_response, upstream_error};

/// Mock Anthropic API server
pub struct MockAnthropic {
    /// Underlying wiremock server
    pub server: MockServer,
}

impl MockAnthropic {
    /// Start a new mock server
    pub async fn new() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL for the gateway's upstream configuration
    pub fn url(&self) -> String {
        self.server.uri()
    }

    fn messages() -> MockBuilder {
        Mock::given(method("POST")).and(path("/v1/messages"))
    }

    fn for_credential(credential: &str) -> MockBuilder {
        Self::messages().and(header("authorization", format!("Bearer {credential}").as_str()))
    }

    /// Answer every call with a buffered reply
    pub async fn mock_message(&self, text: &str, input_tokens: u64, output_tokens: u64) {
        Self::messages()
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(messages_response(text, input_tokens, output_tokens)),
            )
            .mount(&self.server)
            .await;
    }

    /// Answer calls made with `credential` with a buffered reply
    pub async fn mock_message_for(&self, credential: &str, text: &str) {
        Self::for_credential(credential)
            .respond_with(ResponseTemplate::new(200).set_body_json(messages_response(text, 10, 5)))
            .mount(&self.server)
            .await;
    }

    /// Answer calls made with `credential` with an error status
    pub async fn mock_error_for(&self, credential: &str, status: u16, kind: &str) {
        Self::for_credential(credential)
            .respond_with(
                ResponseTemplate::new(status).set_body_json(upstream_error(kind, "mocked failure")),
            )
            .mount(&self.server)
            .await;
    }

    /// Answer every call with an error status
    pub async fn mock_error(&self, status: u16, kind: &str) {
        Self::messages()
            .respond_with(
                ResponseTemplate::new(status).set_body_json(upstream_error(kind, "mocked failure")),
            )
            .mount(&self.server)
            .await;
    }

    /// Answer streamed calls with the concatenated events
    pub async fn mock_stream(&self, events: &[String]) {
        Self::messages()
            .and(body_partial_json(serde_json::json!({"stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(events.concat(), "text/event-stream"))
            .mount(&self.server)
            .await;
    }

    /// Answer every call with a reply held back for `delay`
    pub async fn mock_message_delayed(&self, delay: Duration) {
        Self::messages()
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(messages_response("late", 1, 1))
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    /// Bodies of every call received so far
    pub async fn received_bodies(&self) -> Vec<Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter_map(|r| serde_json::from_slice(&r.body).ok())
            .collect()
    }

    /// Number of calls made with `credential`
    pub async fn calls_for(&self, credential: &str) -> usize {
        let expected = format!("Bearer {credential}");
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| {
                r.headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    == Some(expected.as_str())
            })
            .count()
    }

    /// Total calls received
    pub async fn calls(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map_or(0, |requests| requests.len())
    }
}
