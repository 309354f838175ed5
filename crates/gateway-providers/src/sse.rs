//! Server-sent event helpers for relayed streams.

use bytes::Bytes;
use gateway_core::TokenUsage;
use serde_json::{json, Value};

/// Terminal SSE chunk sent when the upstream stream fails midway.
///
/// With `mid_event` set the chunk first closes the partial event the
/// caller already holds, so the error event parses on its own.
#[must_use]
pub fn interrupted_chunk(message: &str, mid_event: bool) -> Bytes {
    let payload = json!({
        "type": "error",
        "error": {
            "type": "stream_interrupted",
            "message": message,
        }
    });
    let lead = if mid_event { "\n\n" } else { "" };
    Bytes::from(format!("{lead}event: error\ndata: {payload}\n\n"))
}

/// Watches relayed SSE bytes for token usage without altering them.
///
/// Input tokens come from `message_start`, output tokens from the last
/// `message_delta`. Events may be split across chunks at any byte.
#[derive(Debug, Default)]
pub struct UsageTracker {
    pending: Vec<u8>,
    open_event: bool,
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
}

impl UsageTracker {
    /// Create an empty tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk exactly as it was forwarded
    pub fn observe(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = &line[..pos];
            self.open_event = !matches!(line, [] | [b'\r']);
            self.observe_line(line);
        }
    }

    fn observe_line(&mut self, line: &[u8]) {
        let Ok(line) = std::str::from_utf8(line) else {
            return;
        };
        let Some(data) = line.trim_end_matches('\r').strip_prefix("data:") else {
            return;
        };
        let Ok(event) = serde_json::from_str::<Value>(data.trim_start()) else {
            return;
        };

        match event.get("type").and_then(Value::as_str) {
            Some("message_start") => {
                let usage = event.pointer("/message/usage");
                if let Some(n) = usage.and_then(|u| u.get("input_tokens")).and_then(Value::as_u64) {
                    self.input_tokens = Some(n);
                }
                if let Some(n) = usage.and_then(|u| u.get("output_tokens")).and_then(Value::as_u64) {
                    self.output_tokens = Some(n);
                }
            }
            Some("message_delta") => {
                let usage = event.get("usage");
                if let Some(n) = usage.and_then(|u| u.get("output_tokens")).and_then(Value::as_u64) {
                    self.output_tokens = Some(n);
                }
                if let Some(n) = usage.and_then(|u| u.get("input_tokens")).and_then(Value::as_u64) {
                    self.input_tokens = Some(n);
                }
            }
            _ => {}
        }
    }

    /// Whether the bytes forwarded so far stop inside an event
    #[must_use]
    pub fn is_mid_event(&self) -> bool {
        self.open_event || !self.pending.is_empty()
    }

    /// Usage seen so far, `None` if no usage-bearing event passed through
    #[must_use]
    pub fn usage(&self) -> Option<TokenUsage> {
        if self.input_tokens.is_none() && self.output_tokens.is_none() {
            return None;
        }
        Some(TokenUsage::new(
            self.input_tokens.unwrap_or_default(),
            self.output_tokens.unwrap_or_default(),
        ))
    }
}
