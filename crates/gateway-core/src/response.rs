//! Response-side types: token usage and the model catalog.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Token counts reported by the upstream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens
    #[serde(default)]
    pub input_tokens: u64,
    /// Completion tokens
    #[serde(default)]
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Create a usage value
    #[must_use]
    pub const fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Combined token count
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Extract the `usage` object of a buffered Messages API response
    #[must_use]
    pub fn from_response(body: &Value) -> Option<Self> {
        body.get("usage")
            .and_then(|u| serde_json::from_value(u.clone()).ok())
    }
}

/// Catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelObject {
    /// Model identifier
    pub id: String,
    /// Always `model`
    pub object: String,
    /// Creation timestamp
    pub created: i64,
    /// Owner
    pub owned_by: String,
}

impl ModelObject {
    /// Create an Anthropic-owned model entry
    #[must_use]
    pub fn anthropic(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            object: "model".to_string(),
            created: 1_677_610_602,
            owned_by: "anthropic".to_string(),
        }
    }
}

/// `GET /v1/models` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelsResponse {
    /// Always `list`
    pub object: String,
    /// Models
    pub data: Vec<ModelObject>,
}

impl ModelsResponse {
    /// Static catalog served by the gateway
    #[must_use]
    pub fn catalog() -> Self {
        Self {
            object: "list".to_string(),
            data: [
                "claude-3-opus-20240229",
                "claude-3-sonnet-20240229",
                "claude-3-haiku-20240307",
                "claude-sonnet-4-20250514",
                "claude-opus-4-20250514",
            ]
            .into_iter()
            .map(ModelObject::anthropic)
            .collect(),
        }
    }
}
