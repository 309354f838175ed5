//! Inbound Messages API request.
//!
//! The gateway forwards the caller's payload essentially unmodified, so the
//! request keeps the original bytes and only lifts out the fields the
//! pipeline needs: the model name and the streaming flag.

use bytes::Bytes;
use serde_json::Value;

use crate::error::{GatewayError, GatewayResult};

/// A parsed `POST /v1/messages` body
#[derive(Debug, Clone)]
pub struct MessagesRequest {
    body: Bytes,
    model: Option<String>,
    stream: bool,
}

impl MessagesRequest {
    /// Parse a raw body.
    ///
    /// The body must be a JSON object. `model` is optional here; the upstream
    /// decides whether a missing model is an error. `stream` is only honoured
    /// when it is the boolean `true`.
    pub fn parse(body: Bytes) -> GatewayResult<Self> {
        let value: Value = serde_json::from_slice(&body)
            .map_err(|e| GatewayError::bad_request(format!("Invalid JSON: {e}")))?;

        let Value::Object(map) = value else {
            return Err(GatewayError::bad_request("Request body must be a JSON object"));
        };

        let model = map
            .get("model")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .map(String::from);
        let stream = map.get("stream").and_then(Value::as_bool).unwrap_or(false);

        Ok(Self {
            body,
            model,
            stream,
        })
    }

    /// Requested model, if any
    #[must_use]
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Whether the caller asked for a streamed response
    #[must_use]
    pub fn is_stream(&self) -> bool {
        self.stream
    }

    /// Original body bytes
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }
}
