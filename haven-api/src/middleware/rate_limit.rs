use axum::{
    extract::{ConnectInfo, Request, State},
    http::{Extensions, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Duration;
use haven_core::CoreError;
use std::net::SocketAddr;
use tracing::warn;

use crate::error::AppError;
use crate::state::AppState;

const IP_ACTION: &str = "api_request";

/// Per-IP fixed window over every route. Lets traffic through when the
/// counter store is down.
pub async fn ip_rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let ip = client_ip(req.extensions(), req.headers());
    let now = state.now();

    match state
        .ip_limits
        .record_attempt(&ip, IP_ACTION, Duration::minutes(1), now)
        .await
    {
        Ok(record) if record.attempt_count > state.ip_requests_per_minute => {
            let retry_after_secs = (record.window_expires - now).num_seconds().max(1) as u64;
            warn!("IP {} over the request limit", ip);
            AppError::from(CoreError::RateLimited { retry_after_secs }).into_response()
        }
        Ok(_) => next.run(req).await,
        Err(e) => {
            warn!("IP rate limiter unavailable, allowing request: {}", e);
            next.run(req).await
        }
    }
}

/// Peer address when the server records it, else the first forwarded hop.
pub(crate) fn client_ip(extensions: &Extensions, headers: &HeaderMap) -> String {
    if let Some(ConnectInfo(addr)) = extensions.get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
