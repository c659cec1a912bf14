//! Request-governance middleware applied to every HTTP route.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::debug;

use crate::auth;
use crate::state::SharedState;

/// Paths exempt from rate limiting: health probes and the metrics scrape
/// must not be throttled, and favicon noise is not worth tracking.
const EXEMPT_PATHS: &[&str] = &["/api/health", "/api/metrics", "/favicon.ico"];

pub async fn rate_limit(
    State(state): State<SharedState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if EXEMPT_PATHS.contains(&path.as_str()) {
        return next.run(request).await;
    }

    state.metrics.requests_total.inc();

    let method = request.method().as_str().to_string();
    let headers = request.headers();
    // WebSocket upgrades carry their token as a query parameter, so a
    // session owner's upgrade is budgeted as authenticated too.
    let user = auth::authenticated_user(headers, &state.config.auth).or_else(|| {
        if path.starts_with("/ws/") {
            auth::user_from_query(request.uri().query(), &state.config.auth)
        } else {
            None
        }
    });
    let ip = auth::client_ip(headers, addr);
    let agent = auth::user_agent(headers);

    let decision = state
        .rate_limit
        .check_request(&path, &method, user.as_deref(), &ip, &agent);

    if !decision.allowed {
        state.metrics.rate_limited_total.inc();
        debug!(%path, %method, %ip, "request rejected by rate limiter");

        let retry_after = decision.retry_after.unwrap_or(decision.window_secs);
        let body = Json(json!({
            "error": "Rate limit exceeded",
            "retry_after": retry_after,
            "limit": decision.limit,
            "window": decision.window_secs,
        }));
        let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
        if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        return response;
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&decision.limit.to_string()) {
        headers.insert("x-ratelimit-limit", value);
    }
    if let Ok(value) = HeaderValue::from_str(&decision.remaining.to_string()) {
        headers.insert("x-ratelimit-remaining", value);
    }
    if let Ok(value) = HeaderValue::from_str(&decision.reset_time.to_string()) {
        headers.insert("x-ratelimit-reset", value);
    }
    response
}
