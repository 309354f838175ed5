//! # Tenant Authentication
//!
//! Resolves an inbound request to a tenant key:
//!
//! - `X-API-Key: <key>` or `Authorization: Bearer <key>`: the key's SHA-256
//!   digest is looked up in the TTL cache, then in the credential store.
//! - `Authorization: Bearer <jwt>`: an HS256 session token whose `sub` claim
//!   is the tenant key id.
//!
//! A key carrying an enabled client restriction must also present a
//! `User-Agent` matching one of its allow-listed clients.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use gateway_core::cache::{get_json, set_json};
use gateway_core::{
    CacheError, CredentialStore, GatewayError, StoreError, TenantKey, TtlCache, User,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::state::AppState;

/// Leeway applied to token expiry
pub const TOKEN_LEEWAY_SECS: u64 = 60;

/// Header carrying a raw API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Known client ids and the `User-Agent` patterns that identify them
static KNOWN_CLIENTS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("claude_code", r"^claude-cli/[\d.]+\s+\("),
        ("gemini_cli", r"^GeminiCLI/v?[\d.]+\s+\("),
    ]
    .into_iter()
    .filter_map(|(id, pattern)| {
        RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .ok()
            .map(|re| (id, re))
    })
    .collect()
});

/// SHA-256 hex digest of a presented API key
#[must_use]
pub fn hash_api_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Whether `user_agent` identifies the client `client_id`
#[must_use]
pub fn client_matches(client_id: &str, user_agent: &str) -> bool {
    KNOWN_CLIENTS
        .iter()
        .any(|(id, pattern)| *id == client_id && pattern.is_match(user_agent))
}

/// How the caller authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Raw API key
    ApiKey,
    /// Session token
    Token,
}

/// Authenticated caller, stored in request extensions
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Resolved tenant key
    pub key: TenantKey,
    /// Owning user, if the key has one
    pub user: Option<User>,
    /// How the caller authenticated
    pub method: AuthMethod,
}

/// Presented credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// Raw API key
    ApiKey(String),
    /// Session token
    Token(String),
}

impl Credential {
    /// Pull the credential out of request headers.
    ///
    /// `X-API-Key` wins over `Authorization`. A bearer value shaped like a
    /// JWT takes the token path; anything else is treated as an API key.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, AuthError> {
        if let Some(key) = headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|k| !k.is_empty())
        {
            return Ok(Self::ApiKey(key.to_string()));
        }

        let bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(AuthError::MissingCredentials)?;

        if looks_like_jwt(bearer) {
            Ok(Self::Token(bearer.to_string()))
        } else {
            Ok(Self::ApiKey(bearer.to_string()))
        }
    }
}

fn looks_like_jwt(value: &str) -> bool {
    let segments: Vec<&str> = value.split('.').collect();
    segments.len() == 3 && segments.iter().all(|s| !s.is_empty())
}

/// Session token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Tenant key id
    pub sub: String,
    /// Expiry (seconds since epoch)
    pub exp: u64,
}

/// Authentication error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    /// Neither `X-API-Key` nor a bearer credential was sent
    #[error("Missing API key")]
    MissingCredentials,

    /// No tenant key matches the presented key
    #[error("Invalid API key")]
    InvalidApiKey,

    /// The tenant key exists but is disabled or deleted
    #[error("API key is not active")]
    InactiveKey,

    /// Bad signature, expired, or unknown subject
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// A token was presented but no signing secret is configured
    #[error("Token authentication is not enabled")]
    TokenAuthDisabled,

    /// The client restriction rejected the `User-Agent`
    #[error("Client not allowed for this API key")]
    ClientNotAllowed,

    /// Store or cache failure
    #[error("Authentication backend error: {0}")]
    Backend(String),
}

impl AuthError {
    /// HTTP status code for this error
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ClientNotAllowed => 403,
            Self::Backend(_) => 500,
            _ => 401,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<CacheError> for AuthError {
    fn from(err: CacheError) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<AuthError> for GatewayError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::ClientNotAllowed => Self::forbidden(err.to_string()),
            AuthError::Backend(message) => Self::internal(message),
            _ => Self::unauthorized(err.to_string()),
        }
    }
}

struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

/// Resolves requests to tenant keys
pub struct Authenticator {
    store: Arc<dyn CredentialStore>,
    cache: Arc<dyn TtlCache>,
    tokens: Option<TokenVerifier>,
    cache_ttl: Duration,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("store", &self.store.name())
            .field("cache", &self.cache.name())
            .field("tokens_enabled", &self.tokens.is_some())
            .field("cache_ttl", &self.cache_ttl)
            .finish()
    }
}

impl Authenticator {
    /// Create an authenticator; token auth is enabled when `jwt_secret` is set
    pub fn new(
        store: Arc<dyn CredentialStore>,
        cache: Arc<dyn TtlCache>,
        jwt_secret: Option<&SecretString>,
        cache_ttl: Duration,
    ) -> Self {
        let tokens = jwt_secret.map(|secret| {
            let mut validation = Validation::new(Algorithm::HS256);
            validation.leeway = TOKEN_LEEWAY_SECS;
            validation.set_required_spec_claims(&["exp", "sub"]);
            TokenVerifier {
                key: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
                validation,
            }
        });

        Self {
            store,
            cache,
            tokens,
            cache_ttl,
        }
    }

    /// Authenticate a request from its headers
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        let (key, method) = match Credential::from_headers(headers)? {
            Credential::ApiKey(raw) => (self.resolve_api_key(&raw).await?, AuthMethod::ApiKey),
            Credential::Token(token) => (self.resolve_token(&token).await?, AuthMethod::Token),
        };

        let user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        Self::check_client(&key, user_agent)?;

        let user = match key.user_id.as_deref() {
            Some(user_id) => self.resolve_user(user_id).await?,
            None => None,
        };

        debug!(tenant_key = %key.id, method = ?method, "Request authenticated");
        Ok(AuthContext { key, user, method })
    }

    async fn resolve_api_key(&self, raw: &str) -> Result<TenantKey, AuthError> {
        let digest = hash_api_key(raw);
        let cache_key = format!("api_key:{digest}");

        let key = match get_json::<TenantKey>(self.cache.as_ref(), &cache_key).await? {
            Some(key) => key,
            None => {
                let key = self
                    .store
                    .get_tenant_key_by_digest(&digest)
                    .await?
                    .ok_or(AuthError::InvalidApiKey)?;
                if let Err(e) = set_json(self.cache.as_ref(), &cache_key, &key, self.cache_ttl).await {
                    warn!(tenant_key = %key.id, error = %e, "Could not cache API key lookup");
                }
                key
            }
        };

        if !key.is_active() {
            warn!(tenant_key = %key.id, status = ?key.status, "Inactive API key presented");
            return Err(AuthError::InactiveKey);
        }
        Ok(key)
    }

    async fn resolve_token(&self, token: &str) -> Result<TenantKey, AuthError> {
        let verifier = self.tokens.as_ref().ok_or(AuthError::TokenAuthDisabled)?;
        let data = decode::<TokenClaims>(token, &verifier.key, &verifier.validation)
            .map_err(|e| {
                debug!(error = %e, "Token validation failed");
                AuthError::InvalidToken(e.to_string())
            })?;

        let key = self
            .store
            .get_tenant_key_by_id(&data.claims.sub)
            .await?
            .ok_or_else(|| AuthError::InvalidToken("unknown subject".to_string()))?;
        if !key.is_active() {
            return Err(AuthError::InactiveKey);
        }
        Ok(key)
    }

    async fn resolve_user(&self, user_id: &str) -> Result<Option<User>, AuthError> {
        let cache_key = format!("user:{user_id}");
        if let Some(user) = get_json::<User>(self.cache.as_ref(), &cache_key).await? {
            return Ok(Some(user));
        }
        let user = self.store.get_user_by_id(user_id).await?;
        if let Some(user) = &user {
            set_json(self.cache.as_ref(), &cache_key, user, self.cache_ttl).await?;
        }
        Ok(user)
    }

    fn check_client(key: &TenantKey, user_agent: &str) -> Result<(), AuthError> {
        let Some(restrictions) = key.client_restrictions.as_ref().filter(|r| r.is_enforced())
        else {
            return Ok(());
        };

        if restrictions
            .clients
            .iter()
            .any(|client| client_matches(client, user_agent))
        {
            Ok(())
        } else {
            warn!(tenant_key = %key.id, user_agent, "Client restriction rejected request");
            Err(AuthError::ClientNotAllowed)
        }
    }
}

/// Authentication middleware; inserts [`AuthContext`] into request extensions
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    match state.authenticator.authenticate(request.headers()).await {
        Ok(context) => {
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        Err(err) => {
            warn!(error = %err, path = %request.uri().path(), "Authentication failed");
            ApiError::from_gateway(err.into(), state.verbose_errors()).into_response()
        }
    }
}
