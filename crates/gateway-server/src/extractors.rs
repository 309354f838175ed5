//! Custom Axum extractors for the gateway.

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequest, FromRequestParts, Request},
    http::{request::Parts, HeaderMap},
};
use bytes::Bytes;
use gateway_core::MessagesRequest;
use std::net::SocketAddr;
use tracing::debug;

use crate::auth::AuthContext;
use crate::error::ApiError;
use crate::state::AppState;

/// Request id header
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Address recorded when nothing identifies the caller
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Extract request ID from headers or generate one
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), String::from);

        Ok(Self(id))
    }
}

/// Caller address used by the IP gate.
///
/// The socket peer, unless forwarding headers are trusted. Then
/// `CF-Connecting-IP`, the first `X-Forwarded-For` entry and `X-Real-IP`
/// are tried in that order before falling back to the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Resolve the caller address from headers and the socket peer
pub fn resolve_client_ip(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded: bool,
) -> String {
    let forwarded = trust_forwarded
        .then(|| {
            header_value(headers, "cf-connecting-ip")
                .or_else(|| {
                    header_value(headers, "x-forwarded-for")
                        .and_then(|v| v.split(',').next())
                        .map(str::trim)
                        .filter(|v| !v.is_empty())
                })
                .or_else(|| header_value(headers, "x-real-ip"))
        })
        .flatten();

    forwarded
        .map(String::from)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

#[async_trait]
impl FromRequestParts<AppState> for ClientIp {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Ok(Self(resolve_client_ip(
            &parts.headers,
            peer,
            state.config.quota.trust_forwarded_headers,
        )))
    }
}

/// Authenticated caller placed by the auth middleware
#[derive(Debug, Clone)]
pub struct Auth(pub AuthContext);

#[async_trait]
impl<S> FromRequestParts<S> for Auth
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(Self)
            .ok_or_else(|| ApiError::unauthorized("Missing API key"))
    }
}

/// Messages API body, kept as raw bytes plus the fields the pipeline reads
#[derive(Debug)]
pub struct MessagesBody(pub MessagesRequest);

#[async_trait]
impl<S> FromRequest<S> for MessagesBody
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read request body: {e}")))?;

        let request = MessagesRequest::parse(bytes).map_err(|e| {
            debug!(error = %e, "Rejected messages body");
            ApiError::from(e)
        })?;

        Ok(Self(request))
    }
}
