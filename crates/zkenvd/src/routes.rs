//! Custodian API handlers
//!
//!   GET  /api/health          liveness
//!   POST /api/tokens          {multi?, ttl_hours?}  → {token_a, token_b}
//!   POST /api/tokens/get      {token_b}             → {token_a, should_delete}
//!   POST /api/decrypt         {token_a}             → {token_b, should_delete}
//!   POST /api/tokens/delete   {token_b}             → {deleted: true}
//!
//! Resolving never consumes a pair; clients delete after decrypting.

use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::info;
use zkenv_core::store::hash_token;
use zkenv_core::types::{
    IssueRequest, TokenARequest, TokenAResponse, TokenBRequest, TokenBResponse,
};
use zkenv_core::{KnownHalf, Resolution, ZkenvError};

use crate::AppState;

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub async fn issue(State(state): State<AppState>, Json(req): Json<IssueRequest>) -> Response {
    let ttl_hours = state.ttl_hours(req.ttl_hours);
    let multi = req.multi.unwrap_or(false);
    let ttl = Duration::from_secs(u64::from(ttl_hours) * 3600);

    let result = state.with_store(|store| Ok(store.issue(multi, ttl)));
    match result {
        Ok(pair) => {
            state.metrics.record("issue", "ok");
            info!(token_a_hash = %hash_token(&pair.token_a), multi, ttl_hours, "issued token pair");
            Json(pair).into_response()
        }
        Err(e) => error_response("issue", &state, e),
    }
}

pub async fn resolve_by_b(
    State(state): State<AppState>,
    Json(req): Json<TokenBRequest>,
) -> Response {
    let known = KnownHalf::TokenB(req.token_b);
    match resolve(&state, "resolve_b", &known) {
        Ok(res) => Json(TokenAResponse {
            token_a: res.counterpart,
            should_delete: res.should_delete,
        })
        .into_response(),
        Err(e) => error_response("resolve_b", &state, e),
    }
}

/// Legacy pair-only resolve: tokenA in, tokenB out.
pub async fn resolve_by_a(
    State(state): State<AppState>,
    Json(req): Json<TokenARequest>,
) -> Response {
    let known = KnownHalf::TokenA(req.token_a);
    match resolve(&state, "resolve_a", &known) {
        Ok(res) => Json(TokenBResponse {
            token_b: res.counterpart,
            should_delete: res.should_delete,
        })
        .into_response(),
        Err(e) => error_response("resolve_a", &state, e),
    }
}

pub async fn delete(State(state): State<AppState>, Json(req): Json<TokenBRequest>) -> Response {
    match state.with_store(|store| store.delete(&req.token_b)) {
        Ok(()) => {
            state.metrics.record("delete", "ok");
            info!(token_b_hash = %hash_token(&req.token_b), "deleted token pair");
            Json(json!({ "deleted": true })).into_response()
        }
        Err(e) => error_response("delete", &state, e),
    }
}

fn resolve(state: &AppState, op: &str, known: &KnownHalf) -> Result<Resolution, ZkenvError> {
    let result = state.with_store(|store| store.resolve(known));
    // audit: fingerprint of the presented half and hit/miss, never the token
    info!(
        op,
        token_hash = %hash_token(known.as_str()),
        hit = result.is_ok(),
        "resolve attempt"
    );
    if result.is_ok() {
        state.metrics.record(op, "ok");
    }
    result
}

fn error_response(op: &str, state: &AppState, e: ZkenvError) -> Response {
    let (status, outcome, message) = match e {
        ZkenvError::TokenNotFound => (
            StatusCode::NOT_FOUND,
            "not_found",
            "Token not found or already used".to_string(),
        ),
        other => {
            tracing::error!(op, error = %other, "custodian request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "error",
                "Token store unavailable".to_string(),
            )
        }
    };
    state.metrics.record(op, outcome);
    (status, Json(json!({ "error": message }))).into_response()
}
