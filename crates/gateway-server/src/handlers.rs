//! HTTP request handlers for the gateway API.

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use gateway_core::cache::{get_json, set_json};
use gateway_core::{
    ClientRestrictions, Dimension, GatewayError, KeyStatus, MessagesRequest, ModelsResponse,
    QuotaPolicy, TokenUsage, UpstreamAccount, UsageFilter, UsageRecord, UserRole, Window,
};
use gateway_providers::{RelayError, RelayStream, StreamOutcome};
use gateway_routing::FailureKind;
use gateway_telemetry::{MeteredCall, UsageSummary};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::Infallible;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    auth::{AuthContext, AuthMethod},
    error::ApiError,
    extractors::{Auth, MessagesBody, RequestId},
    state::AppState,
};

/// Default look-back for usage statistics
pub const DEFAULT_STATS_DAYS: i64 = 30;

/// Default and maximum number of records returned by usage statistics
pub const DEFAULT_STATS_LIMIT: usize = 100;
const MAX_STATS_LIMIT: usize = 1000;

/// Model recorded when the caller did not name one
const UNKNOWN_MODEL: &str = "unknown";

/// Relay a Messages API call: quota, account selection, relay, metering
#[instrument(skip_all, fields(request_id = %request_id, tenant_key = %auth.key.id))]
pub async fn messages(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    Auth(auth): Auth,
    MessagesBody(request): MessagesBody,
) -> Result<Response, ApiError> {
    state
        .ledger
        .enforce(&auth.key)
        .await
        .map_err(|e| state.api_error(e))?;

    let account = state.pool.select().await.map_err(|e| state.api_error(e))?;

    debug!(
        account_id = %account.id,
        model = request.model().unwrap_or(UNKNOWN_MODEL),
        stream = request.is_stream(),
        "Relaying messages request"
    );

    if request.is_stream() {
        relay_streamed(state, auth, request_id, account, request).await
    } else {
        relay_buffered(state, auth, request_id, account, request).await
    }
}

async fn relay_buffered(
    state: AppState,
    auth: AuthContext,
    request_id: String,
    account: UpstreamAccount,
    request: MessagesRequest,
) -> Result<Response, ApiError> {
    let response = match state.relay.relay_buffered(&account, &request).await {
        Ok(response) => response,
        Err(err) => return Err(relay_failed(&state, &account, err).await),
    };

    report_success(&state, &account).await;

    if let Some(usage) = response.usage {
        state.meter.spawn(metered_call(&auth, &request, &account, &request_id, usage));
    } else {
        warn!(account_id = %account.id, "Upstream response carried no usage");
    }

    info!(account_id = %account.id, status = response.status, "Messages request completed");
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::OK);
    Ok((status, Json(response.body)).into_response())
}

async fn relay_streamed(
    state: AppState,
    auth: AuthContext,
    request_id: String,
    account: UpstreamAccount,
    request: MessagesRequest,
) -> Result<Response, ApiError> {
    let RelayStream {
        status,
        content_type,
        chunks,
        outcome,
    } = match state.relay.relay_stream(&account, &request).await {
        Ok(stream) => stream,
        Err(err) => return Err(relay_failed(&state, &account, err).await),
    };

    // Settle the account and meter once the producer stops
    tokio::spawn(async move {
        let Ok(outcome) = outcome.await else {
            error!(request_id = %request_id, "Stream producer ended without an outcome");
            return;
        };
        match outcome {
            StreamOutcome::Completed(usage) => {
                report_success(&state, &account).await;
                match usage {
                    Some(usage) => {
                        let call = metered_call(&auth, &request, &account, &request_id, usage);
                        if let Err(e) = state.meter.record(call).await {
                            error!(request_id = %request_id, error = %e, "Failed to record usage");
                        }
                    }
                    None => warn!(request_id = %request_id, "Stream carried no usage"),
                }
            }
            StreamOutcome::Interrupted(reason) => {
                if let Err(e) = state
                    .pool
                    .report_failure(&account.id, FailureKind::Transport)
                    .await
                {
                    error!(account_id = %account.id, error = %e, "Failed to report failure");
                }
                warn!(request_id = %request_id, reason = %reason, "Stream interrupted");
            }
            StreamOutcome::Cancelled => {
                debug!(request_id = %request_id, "Caller left before the stream finished");
            }
        }
    });

    let body = futures::stream::unfold(chunks, |mut rx| async move {
        rx.recv()
            .await
            .map(|chunk| (Ok::<Bytes, Infallible>(chunk), rx))
    });

    let content_type = content_type
        .and_then(|v| HeaderValue::from_str(&v).ok())
        .unwrap_or_else(|| HeaderValue::from_static("text/event-stream"));

    let mut response = Response::new(Body::from_stream(body));
    *response.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    Ok(response)
}

/// Report a relay failure to the pool and render it
async fn relay_failed(state: &AppState, account: &UpstreamAccount, err: RelayError) -> ApiError {
    let kind = match &err {
        RelayError::Status { status, .. } => Some(FailureKind::from_status(*status)),
        RelayError::Transport(_) => Some(FailureKind::Transport),
        RelayError::InvalidResponse(_) => Some(FailureKind::Upstream(502)),
        RelayError::Client(_) => None,
    };
    if let Some(kind) = kind {
        if let Err(e) = state.pool.report_failure(&account.id, kind).await {
            error!(account_id = %account.id, error = %e, "Failed to report failure");
        }
    }
    warn!(account_id = %account.id, error = %err, "Relay failed");
    state.api_error(GatewayError::from(err))
}

async fn report_success(state: &AppState, account: &UpstreamAccount) {
    if let Err(e) = state.pool.report_success(&account.id).await {
        warn!(account_id = %account.id, error = %e, "Failed to stamp account usage");
    }
}

fn metered_call(
    auth: &AuthContext,
    request: &MessagesRequest,
    account: &UpstreamAccount,
    request_id: &str,
    usage: TokenUsage,
) -> MeteredCall {
    MeteredCall {
        tenant_key_id: auth.key.id.clone(),
        model: request.model().unwrap_or(UNKNOWN_MODEL).to_string(),
        usage,
        account_id: Some(account.id.clone()),
        request_id: request_id.to_string(),
    }
}

/// Static model catalog
pub async fn list_models() -> Json<ModelsResponse> {
    Json(ModelsResponse::catalog())
}

/// Owner summary in key info
#[derive(Debug, Serialize)]
pub struct OwnerInfo {
    /// User id
    pub id: String,
    /// Username
    pub username: String,
    /// Role
    pub role: UserRole,
}

/// Counters for one window
#[derive(Debug, Default, Serialize)]
pub struct WindowUsage {
    /// Requests counted in the current bucket
    pub requests: u64,
    /// Tokens counted in the current bucket
    pub tokens: u64,
}

/// Authenticated key summary; never includes the digest
#[derive(Debug, Serialize)]
pub struct KeyInfoResponse {
    /// Key id
    pub id: String,
    /// Key name
    pub name: String,
    /// Status
    pub status: KeyStatus,
    /// How the caller authenticated
    pub auth_method: AuthMethod,
    /// Owner
    pub user: Option<OwnerInfo>,
    /// Quota policy
    pub limits: Option<QuotaPolicy>,
    /// Client restriction
    pub client_restrictions: Option<ClientRestrictions>,
    /// Lifetime request count
    pub total_requests: u64,
    /// Lifetime token count
    pub total_tokens: u64,
    /// Current bucket counters keyed by window
    pub current_usage: BTreeMap<&'static str, WindowUsage>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Summary of the authenticated key
#[instrument(skip_all, fields(tenant_key = %auth.key.id))]
pub async fn key_info(
    State(state): State<AppState>,
    Auth(auth): Auth,
) -> Result<Json<KeyInfoResponse>, ApiError> {
    let mut current_usage = BTreeMap::new();
    for window in Window::ALL {
        let requests = state
            .ledger
            .usage(&auth.key.id, Dimension::Requests, window)
            .await
            .map_err(|e| state.api_error(e.into()))?;
        let tokens = state
            .ledger
            .usage(&auth.key.id, Dimension::Tokens, window)
            .await
            .map_err(|e| state.api_error(e.into()))?;
        current_usage.insert(window.as_str(), WindowUsage { requests, tokens });
    }

    let key = auth.key;
    Ok(Json(KeyInfoResponse {
        id: key.id,
        name: key.name,
        status: key.status,
        auth_method: auth.method,
        user: auth.user.map(|u| OwnerInfo {
            id: u.id,
            username: u.username,
            role: u.role,
        }),
        limits: key.limits,
        client_restrictions: key.client_restrictions,
        total_requests: key.total_requests,
        total_tokens: key.total_tokens,
        current_usage,
        created_at: key.created_at,
    }))
}

/// Query parameters for usage statistics
#[derive(Debug, Default, Deserialize)]
pub struct UsageStatsQuery {
    /// Inclusive lower bound (RFC 3339); defaults to 30 days ago
    pub start_date: Option<DateTime<Utc>>,
    /// Inclusive upper bound (RFC 3339); defaults to now
    pub end_date: Option<DateTime<Utc>>,
    /// Maximum records returned; defaults to 100
    pub limit: Option<usize>,
}

/// Usage statistics response
#[derive(Debug, Serialize)]
pub struct UsageStatsResponse {
    /// Key id
    pub tenant_key_id: String,
    /// Effective lower bound
    pub start_date: DateTime<Utc>,
    /// Effective upper bound
    pub end_date: DateTime<Utc>,
    /// Totals and per-model breakdown over the returned records
    pub summary: UsageSummary,
    /// Records, newest first
    pub records: Vec<UsageRecord>,
}

/// Usage statistics of the authenticated key
#[instrument(skip_all, fields(tenant_key = %auth.key.id))]
pub async fn usage_stats(
    State(state): State<AppState>,
    Auth(auth): Auth,
    Query(query): Query<UsageStatsQuery>,
) -> Result<Json<UsageStatsResponse>, ApiError> {
    let end = query.end_date.unwrap_or_else(Utc::now);
    let start = query
        .start_date
        .unwrap_or_else(|| end - Duration::days(DEFAULT_STATS_DAYS));
    if start > end {
        return Err(state.api_error(GatewayError::bad_request(
            "start_date must not be after end_date",
        )));
    }
    let limit = query
        .limit
        .unwrap_or(DEFAULT_STATS_LIMIT)
        .clamp(1, MAX_STATS_LIMIT);

    let filter = UsageFilter {
        tenant_key_id: Some(auth.key.id.clone()),
        start: Some(start),
        end: Some(end),
        limit: Some(limit),
    };
    let records = state
        .store
        .list_usage_records(&filter)
        .await
        .map_err(|e| state.api_error(e.into()))?;

    Ok(Json(UsageStatsResponse {
        tenant_key_id: auth.key.id,
        start_date: start,
        end_date: end,
        summary: UsageSummary::from_records(&records),
        records,
    }))
}

/// Cache entry holding the last pool summary
pub const ACCOUNTS_STATUS_KEY: &str = "accounts_status";

/// How long a pool summary is served from cache
pub const ACCOUNTS_STATUS_TTL: std::time::Duration = std::time::Duration::from_secs(300);

/// Upstream pool counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStatus {
    /// Accounts in the pool, whatever their status
    pub total: usize,
    /// Accounts eligible for selection
    pub active: usize,
    /// When the counts were taken
    pub last_check: DateTime<Utc>,
}

/// Upstream pool summary response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountsStatusResponse {
    /// Anthropic account pool
    pub claude: PoolStatus,
}

/// Summary of the upstream account pool, cached for five minutes
pub async fn accounts_status(
    State(state): State<AppState>,
) -> Result<Json<AccountsStatusResponse>, ApiError> {
    let cache = state.cache.as_ref();
    let cached = get_json::<AccountsStatusResponse>(cache, ACCOUNTS_STATUS_KEY)
        .await
        .map_err(|e| state.api_error(e.into()))?;
    if let Some(status) = cached {
        return Ok(Json(status));
    }

    let summary = state.pool.summary().await.map_err(|e| state.api_error(e))?;
    let status = AccountsStatusResponse {
        claude: PoolStatus {
            total: summary.total,
            active: summary.active,
            last_check: Utc::now(),
        },
    };

    if let Err(e) = set_json(cache, ACCOUNTS_STATUS_KEY, &status, ACCOUNTS_STATUS_TTL).await {
        warn!(error = %e, "Failed to cache accounts status");
    }
    Ok(Json(status))
}
