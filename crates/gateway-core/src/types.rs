//! Domain types for tenants, upstream accounts, quotas and usage.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::store::StoreError;

/// Lifecycle status of a tenant key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    /// Usable
    #[default]
    Active,
    /// Temporarily switched off by an administrator
    Disabled,
    /// Soft-deleted; never hard-deleted
    Deleted,
}

impl fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Disabled => write!(f, "disabled"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// Lifecycle status of an upstream account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    /// Eligible for selection
    #[default]
    Active,
    /// Parked by an administrator
    Inactive,
    /// Rejected by the upstream; needs an administrator to restore it
    Invalid,
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Inactive => write!(f, "inactive"),
            Self::Invalid => write!(f, "invalid"),
        }
    }
}

/// Quota time window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Window {
    /// 60 second buckets
    Minute,
    /// 3600 second buckets
    Hour,
    /// 86400 second buckets
    Day,
}

impl Window {
    /// All windows, finest first
    pub const ALL: [Self; 3] = [Self::Minute, Self::Hour, Self::Day];

    /// Bucket length in seconds
    #[must_use]
    pub const fn seconds(self) -> u64 {
        match self {
            Self::Minute => 60,
            Self::Hour => 3_600,
            Self::Day => 86_400,
        }
    }

    /// Stable name used in counter keys
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quota resource dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    /// Number of requests
    Requests,
    /// Number of input plus output tokens
    Tokens,
}

impl Dimension {
    /// Stable name used in counter keys
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Requests => "requests",
            Self::Tokens => "tokens",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request-count limits per window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Requests per minute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_per_minute: Option<u64>,
    /// Requests per hour
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_per_hour: Option<u64>,
    /// Requests per day
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_per_day: Option<u64>,
}

/// Token-count limits per window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenLimitPolicy {
    /// Tokens per minute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_per_minute: Option<u64>,
    /// Tokens per hour
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_per_hour: Option<u64>,
    /// Tokens per day
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_per_day: Option<u64>,
}

/// Quota policy attached to a tenant key.
///
/// An absent limit means that dimension/window pair is unbounded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaPolicy {
    /// Request-count limits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitPolicy>,
    /// Token-count limits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_limit: Option<TokenLimitPolicy>,
}

impl QuotaPolicy {
    /// Create an empty (unbounded) policy
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a request limit for a window
    #[must_use]
    pub fn with_request_limit(mut self, window: Window, limit: u64) -> Self {
        let policy = self.rate_limit.get_or_insert_with(RateLimitPolicy::default);
        match window {
            Window::Minute => policy.requests_per_minute = Some(limit),
            Window::Hour => policy.requests_per_hour = Some(limit),
            Window::Day => policy.requests_per_day = Some(limit),
        }
        self
    }

    /// Set a token limit for a window
    #[must_use]
    pub fn with_token_limit(mut self, window: Window, limit: u64) -> Self {
        let policy = self.token_limit.get_or_insert_with(TokenLimitPolicy::default);
        match window {
            Window::Minute => policy.tokens_per_minute = Some(limit),
            Window::Hour => policy.tokens_per_hour = Some(limit),
            Window::Day => policy.tokens_per_day = Some(limit),
        }
        self
    }

    /// Configured limit for a dimension and window
    #[must_use]
    pub fn limit(&self, dimension: Dimension, window: Window) -> Option<u64> {
        match dimension {
            Dimension::Requests => self.rate_limit.as_ref().and_then(|p| match window {
                Window::Minute => p.requests_per_minute,
                Window::Hour => p.requests_per_hour,
                Window::Day => p.requests_per_day,
            }),
            Dimension::Tokens => self.token_limit.as_ref().and_then(|p| match window {
                Window::Minute => p.tokens_per_minute,
                Window::Hour => p.tokens_per_hour,
                Window::Day => p.tokens_per_day,
            }),
        }
    }

    /// Whether any limit is configured for the dimension
    #[must_use]
    pub fn has_limits(&self, dimension: Dimension) -> bool {
        Window::ALL
            .iter()
            .any(|w| self.limit(dimension, *w).is_some())
    }

    /// Validate the policy. A limit of zero is rejected; use a disabled key
    /// to block a tenant instead.
    pub fn validate(&self) -> Result<(), String> {
        for dimension in [Dimension::Requests, Dimension::Tokens] {
            for window in Window::ALL {
                if self.limit(dimension, window) == Some(0) {
                    return Err(format!("{dimension} limit per {window} must be greater than zero"));
                }
            }
        }
        Ok(())
    }
}

/// Allow-list of calling clients, matched against the caller's User-Agent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRestrictions {
    /// Whether the restriction is enforced
    #[serde(default)]
    pub enabled: bool,
    /// Allowed client identifiers (e.g. `claude_code`)
    #[serde(default)]
    pub clients: Vec<String>,
}

impl ClientRestrictions {
    /// Create an enabled restriction for the given clients
    #[must_use]
    pub fn allow<I, S>(clients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            enabled: true,
            clients: clients.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether the restriction has any effect
    #[must_use]
    pub fn is_enforced(&self) -> bool {
        self.enabled && !self.clients.is_empty()
    }
}

/// A caller-facing credential
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantKey {
    /// Unique identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// SHA-256 hex digest of the presented key
    pub key_digest: String,
    /// Owning user, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Lifecycle status
    #[serde(default)]
    pub status: KeyStatus,
    /// Quota policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<QuotaPolicy>,
    /// Client restriction policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_restrictions: Option<ClientRestrictions>,
    /// Advisory request counter
    #[serde(default)]
    pub total_requests: u64,
    /// Advisory token counter
    #[serde(default)]
    pub total_tokens: u64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl TenantKey {
    /// Create an active key with no limits
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        key_digest: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            key_digest: key_digest.into(),
            user_id: None,
            status: KeyStatus::Active,
            limits: None,
            client_restrictions: None,
            total_requests: 0,
            total_tokens: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the owning user
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the status
    #[must_use]
    pub fn with_status(mut self, status: KeyStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the quota policy
    #[must_use]
    pub fn with_limits(mut self, limits: QuotaPolicy) -> Self {
        self.limits = Some(limits);
        self
    }

    /// Set the client restriction policy
    #[must_use]
    pub fn with_client_restrictions(mut self, restrictions: ClientRestrictions) -> Self {
        self.client_restrictions = Some(restrictions);
        self
    }

    /// Whether the key may be used
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == KeyStatus::Active
    }

    /// Validate the record before it enters or leaves the store
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.id.is_empty() {
            return Err(StoreError::invalid_record("<empty>", "tenant key id is empty"));
        }
        if self.key_digest.len() != 64 || !self.key_digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StoreError::invalid_record(
                &self.id,
                "key digest must be a 64 character hex string",
            ));
        }
        if let Some(limits) = &self.limits {
            limits
                .validate()
                .map_err(|reason| StoreError::invalid_record(&self.id, reason))?;
        }
        Ok(())
    }
}

/// User role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Administrator
    Admin,
    /// Regular user
    #[default]
    User,
}

/// A user owning tenant keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: String,
    /// Login name
    pub username: String,
    /// Role
    #[serde(default)]
    pub role: UserRole,
}

impl User {
    /// Create a regular user
    #[must_use]
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            role: UserRole::User,
        }
    }
}

/// Outbound proxy for an upstream account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Whether the proxy is used
    #[serde(default)]
    pub enabled: bool,
    /// Proxy URL, e.g. `socks5://10.0.0.1:1080` or `http://proxy:3128`
    pub url: String,
}

/// A provider-side credential the gateway uses on the caller's behalf
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamAccount {
    /// Unique identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Bearer credential sent to the upstream
    pub credential: SecretString,
    /// Optional outbound proxy
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
    /// Group affiliation
    #[serde(default)]
    pub group_id: Option<String>,
    /// Lifecycle status
    #[serde(default)]
    pub status: AccountStatus,
    /// Upstream failures since the last administrator reset
    #[serde(default)]
    pub error_count: u32,
    /// Last time the account served a request
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
}

impl UpstreamAccount {
    /// Create an active account
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            credential: SecretString::new(credential.into()),
            proxy: None,
            group_id: None,
            status: AccountStatus::Active,
            error_count: 0,
            last_used_at: None,
        }
    }

    /// Set the status
    #[must_use]
    pub fn with_status(mut self, status: AccountStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the group
    #[must_use]
    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Route this account's traffic through a proxy
    #[must_use]
    pub fn with_proxy(mut self, url: impl Into<String>) -> Self {
        self.proxy = Some(ProxyConfig {
            enabled: true,
            url: url.into(),
        });
        self
    }

    /// Proxy URL if one is configured and enabled
    #[must_use]
    pub fn proxy_url(&self) -> Option<&str> {
        self.proxy
            .as_ref()
            .filter(|p| p.enabled && !p.url.is_empty())
            .map(|p| p.url.as_str())
    }

    /// Apply a patch in place
    pub fn apply(&mut self, patch: &AccountPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(count) = patch.error_count {
            self.error_count = count;
        }
        if let Some(at) = patch.last_used_at {
            self.last_used_at = Some(at);
        }
    }
}

/// Partial update for an upstream account; only present fields are applied
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountPatch {
    /// New status
    pub status: Option<AccountStatus>,
    /// New error count
    pub error_count: Option<u32>,
    /// New last-used timestamp
    pub last_used_at: Option<DateTime<Utc>>,
}

impl AccountPatch {
    /// Patch that only changes the status
    #[must_use]
    pub fn status(status: AccountStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Patch that only changes the error count
    #[must_use]
    pub fn error_count(count: u32) -> Self {
        Self {
            error_count: Some(count),
            ..Self::default()
        }
    }

    /// Patch that only changes the last-used timestamp
    #[must_use]
    pub fn last_used_at(at: DateTime<Utc>) -> Self {
        Self {
            last_used_at: Some(at),
            ..Self::default()
        }
    }
}

/// Immutable record of one completed upstream call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Record identifier
    pub id: String,
    /// Tenant key that made the call
    pub tenant_key_id: String,
    /// Model identifier
    pub model: String,
    /// Input tokens
    pub input_tokens: u64,
    /// Output tokens
    pub output_tokens: u64,
    /// Cost in USD
    pub cost: f64,
    /// Upstream account that served the call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    /// Gateway request identifier
    pub request_id: String,
    /// When the call completed
    pub timestamp: DateTime<Utc>,
}

impl UsageRecord {
    /// Combined token count
    #[must_use]
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Filter for listing usage records
#[derive(Debug, Clone, Default)]
pub struct UsageFilter {
    /// Only records of this tenant key
    pub tenant_key_id: Option<String>,
    /// Inclusive lower bound
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound
    pub end: Option<DateTime<Utc>>,
    /// Maximum number of records, newest first
    pub limit: Option<usize>,
}

impl UsageFilter {
    /// Whether a record passes the time and key filters
    #[must_use]
    pub fn matches(&self, record: &UsageRecord) -> bool {
        self.tenant_key_id
            .as_deref()
            .map_or(true, |id| record.tenant_key_id == id)
            && self.start.map_or(true, |start| record.timestamp >= start)
            && self.end.map_or(true, |end| record.timestamp <= end)
    }
}
