//! Fixed-window per-client rate limit
//!
//! The client is the first `x-forwarded-for` hop when present, else the peer
//! address. Each client gets `max` requests per window; the window starts at
//! its first request.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::AppState;

pub struct RateLimiter {
    max: u32,
    window: Duration,
    clients: Mutex<HashMap<String, (Instant, u32)>>,
}

impl RateLimiter {
    pub fn new(max: u32, window: Duration) -> Self {
        Self {
            max,
            window,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Count one request from `client`. `Err` carries seconds until the window resets.
    pub fn check(&self, client: &str, now: Instant) -> Result<(), u64> {
        let Ok(mut clients) = self.clients.lock() else {
            // poisoned: fail open
            return Ok(());
        };
        clients.retain(|_, (start, _)| now.duration_since(*start) < self.window);

        let (start, count) = clients.entry(client.to_string()).or_insert((now, 0));
        *count += 1;
        if *count > self.max {
            let remaining = self.window.saturating_sub(now.duration_since(*start));
            Err(remaining.as_secs().max(1))
        } else {
            Ok(())
        }
    }
}

pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match (forwarded, peer) {
        (Some(ip), _) => ip.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => "unknown".to_string(),
    }
}

pub async fn rate_limit(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_key(req.headers(), peer);

    match state.limiter.check(&client, Instant::now()) {
        Ok(()) => next.run(req).await,
        Err(retry_after) => {
            state.metrics.rate_limited.inc();
            tracing::warn!(
                client = %client,
                retry_after,
                path = %req.uri().path(),
                "rate limit exceeded"
            );
            (
                StatusCode::TOO_MANY_REQUESTS,
                [("retry-after", retry_after.to_string())],
                Json(serde_json::json!({ "error": "Rate limit exceeded" })),
            )
                .into_response()
        }
    }
}
