//! Model pricing and usage aggregation.
//!
//! Rates are USD per million tokens. Unknown models are billed at the
//! default tier rather than rejected.

use chrono::{DateTime, Utc};
use gateway_core::UsageRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Model whose rates apply to unknown models
pub const DEFAULT_PRICING_MODEL: &str = "claude-3-sonnet-20240229";

const TOKENS_PER_UNIT: f64 = 1_000_000.0;

/// Rates for one model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// USD per million input tokens
    pub input_per_million: f64,
    /// USD per million output tokens
    pub output_per_million: f64,
}

impl ModelPricing {
    /// Create a rate pair
    #[must_use]
    pub const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    /// Cost of one call
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn calculate_cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        let input_cost = (input_tokens as f64 / TOKENS_PER_UNIT) * self.input_per_million;
        let output_cost = (output_tokens as f64 / TOKENS_PER_UNIT) * self.output_per_million;
        input_cost + output_cost
    }
}

/// Pricing table with a default tier
#[derive(Debug, Clone)]
pub struct PricingTable {
    models: HashMap<String, ModelPricing>,
    default_model: String,
}

impl Default for PricingTable {
    fn default() -> Self {
        let models = [
            ("claude-3-opus-20240229", ModelPricing::new(15.0, 75.0)),
            ("claude-3-sonnet-20240229", ModelPricing::new(3.0, 15.0)),
            ("claude-3-haiku-20240307", ModelPricing::new(0.25, 1.25)),
            ("claude-sonnet-4-20250514", ModelPricing::new(3.0, 15.0)),
            ("claude-opus-4-20250514", ModelPricing::new(15.0, 75.0)),
        ]
        .into_iter()
        .map(|(model, pricing)| (model.to_string(), pricing))
        .collect();

        Self {
            models,
            default_model: DEFAULT_PRICING_MODEL.to_string(),
        }
    }
}

impl PricingTable {
    /// Build a table from configured rates.
    ///
    /// An empty rate list keeps the built-in table; a non-empty one replaces
    /// it entirely.
    #[must_use]
    pub fn from_rates<I, S>(default_model: impl Into<String>, rates: I) -> Self
    where
        I: IntoIterator<Item = (S, ModelPricing)>,
        S: Into<String>,
    {
        let mut table = Self::default();
        let models: HashMap<String, ModelPricing> =
            rates.into_iter().map(|(m, p)| (m.into(), p)).collect();
        if !models.is_empty() {
            table.models = models;
        }
        table.default_model = default_model.into();
        table
    }

    /// Add or replace one model's rates
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>, pricing: ModelPricing) -> Self {
        self.models.insert(model.into(), pricing);
        self
    }

    /// Rates for `model`, falling back to the default tier
    #[must_use]
    pub fn pricing(&self, model: &str) -> ModelPricing {
        self.models
            .get(model)
            .or_else(|| self.models.get(&self.default_model))
            .copied()
            .unwrap_or(ModelPricing::new(3.0, 15.0))
    }

    /// Cost of one call against `model`
    #[must_use]
    pub fn calculate_cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        self.pricing(model).calculate_cost(input_tokens, output_tokens)
    }

    /// Number of priced models
    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether the table has no explicit models
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Per-model slice of a usage summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelUsage {
    /// Calls
    pub requests: u64,
    /// Input tokens
    pub input_tokens: u64,
    /// Output tokens
    pub output_tokens: u64,
    /// Cost (USD)
    pub cost: f64,
}

/// Aggregated usage over a set of records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    /// Total calls
    pub total_requests: u64,
    /// Total input tokens
    pub total_input_tokens: u64,
    /// Total output tokens
    pub total_output_tokens: u64,
    /// Total cost (USD)
    pub total_cost: f64,
    /// Earliest record
    pub period_start: Option<DateTime<Utc>>,
    /// Latest record
    pub period_end: Option<DateTime<Utc>>,
    /// Breakdown keyed by model
    pub models: BTreeMap<String, ModelUsage>,
}

impl UsageSummary {
    /// Summarize records
    #[must_use]
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a UsageRecord>) -> Self {
        let mut summary = Self::default();
        for record in records {
            summary.add_record(record);
        }
        summary
    }

    /// Fold one record in
    pub fn add_record(&mut self, record: &UsageRecord) {
        self.total_requests += 1;
        self.total_input_tokens += record.input_tokens;
        self.total_output_tokens += record.output_tokens;
        self.total_cost += record.cost;

        let model = self.models.entry(record.model.clone()).or_default();
        model.requests += 1;
        model.input_tokens += record.input_tokens;
        model.output_tokens += record.output_tokens;
        model.cost += record.cost;

        if self.period_start.map_or(true, |start| record.timestamp < start) {
            self.period_start = Some(record.timestamp);
        }
        if self.period_end.map_or(true, |end| record.timestamp > end) {
            self.period_end = Some(record.timestamp);
        }
    }
}
