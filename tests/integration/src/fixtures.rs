//! Test fixtures and sample data for integration tests

use gateway_core::{QuotaPolicy, TenantKey, UpstreamAccount};
use gateway_server::hash_api_key;
use serde_json::{json, Value};

/// Raw API key of the default test tenant
pub const TEST_API_KEY: &str = "sk-relay-integration";

/// Model used by request fixtures
pub const TEST_MODEL: &str = "claude-3-haiku-20240307";

/// Active tenant key for [`TEST_API_KEY`] with no limits
pub fn test_tenant_key() -> TenantKey {
    TenantKey::new("key-1", "integration", hash_api_key(TEST_API_KEY))
}

/// Tenant key for [`TEST_API_KEY`] with the given policy
pub fn limited_tenant_key(limits: QuotaPolicy) -> TenantKey {
    test_tenant_key().with_limits(limits)
}

/// Active upstream account whose credential is `sk-ant-{id}`
pub fn test_account(id: &str) -> UpstreamAccount {
    UpstreamAccount::new(id, format!("account {id}"), format!("sk-ant-{id}"))
}

/// A buffered Messages API request body
pub fn messages_request(prompt: &str) -> Value {
    json!({
        "model": TEST_MODEL,
        "max_tokens": 128,
        "messages": [{"role": "user", "content": prompt}]
    })
}

/// A streamed Messages API request body
pub fn streaming_messages_request(prompt: &str) -> Value {
    let mut body = messages_request(prompt);
    body["stream"] = json!(true);
    body
}

/// A successful buffered Messages API response
pub fn messages_response(text: &str, input_tokens: u64, output_tokens: u64) -> Value {
    json!({
        "id": format!("msg_{}", uuid::Uuid::new_v4().simple()),
        "type": "message",
        "role": "assistant",
        "model": TEST_MODEL,
        "content": [{"type": "text", "text": text}],
        "stop_reason": "end_turn",
        "usage": {"input_tokens": input_tokens, "output_tokens": output_tokens}
    })
}

/// An upstream error body
pub fn upstream_error(kind: &str, message: &str) -> Value {
    json!({
        "type": "error",
        "error": {"type": kind, "message": message}
    })
}

/// SSE events for a streamed reply, one event per text piece
pub fn sse_events(pieces: &[&str], input_tokens: u64, output_tokens: u64) -> Vec<String> {
    let mut events = vec![format!(
        "event: message_start\ndata: {}\n\n",
        json!({
            "type": "message_start",
            "message": {"id": "msg_stream", "model": TEST_MODEL,
                        "usage": {"input_tokens": input_tokens, "output_tokens": 1}}
        })
    )];
    for piece in pieces {
        events.push(format!(
            "event: content_block_delta\ndata: {}\n\n",
            json!({
                "type": "content_block_delta",
                "index": 0,
                "delta": {"type": "text_delta", "text": piece}
            })
        ));
    }
    events.push(format!(
        "event: message_delta\ndata: {}\n\n",
        json!({
            "type": "message_delta",
            "delta": {"stop_reason": "end_turn"},
            "usage": {"output_tokens": output_tokens}
        })
    ));
    events.push("event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n".to_string());
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_events_shape() {
        let events = sse_events(&["a", "b"], 3, 4);
        assert_eq!(events.len(), 5);
        assert!(events.iter().all(|e| e.ends_with("\n\n")));
        assert!(events[0].contains("\"input_tokens\":3"));
    }

    #[test]
    fn test_streaming_request_flag() {
        assert_eq!(streaming_messages_request("hi")["stream"], true);
        assert!(messages_request("hi").get("stream").is_none());
    }
}
