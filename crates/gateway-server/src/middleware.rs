//! HTTP middleware.

use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::extractors::{ClientIp, REQUEST_ID_HEADER};
use crate::state::AppState;

/// Make sure every request carries an `x-request-id` and echo it back
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = match request.headers().get(REQUEST_ID_HEADER) {
        Some(value) if !value.is_empty() => value.clone(),
        _ => {
            let generated = uuid::Uuid::new_v4().to_string();
            let value = HeaderValue::from_str(&generated)
                .unwrap_or_else(|_| HeaderValue::from_static("invalid"));
            request
                .headers_mut()
                .insert(REQUEST_ID_HEADER, value.clone());
            value
        }
    };

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(REQUEST_ID_HEADER, request_id);
    response
}

/// Per-address admission, ahead of authentication
pub async fn ip_gate_middleware(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    request: Request,
    next: Next,
) -> Response {
    if let Some(gate) = &state.ip_gate {
        if let Err(err) = gate.admit(&ip).await {
            debug!(client_ip = %ip, "Request rejected by IP gate");
            return state.api_error(err).into_response();
        }
    }
    next.run(request).await
}
