//! Prometheus counters and the /metrics handler

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use prometheus_client::{
    encoding::text::encode,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};

use crate::AppState;

#[derive(Clone, Default)]
pub struct CustodianMetrics {
    pub requests: Family<Vec<(String, String)>, Counter>,
    pub rate_limited: Counter,
    pub live_pairs: Gauge,
}

impl CustodianMetrics {
    pub fn new(registry: &mut Registry) -> Self {
        let metrics = Self::default();
        registry.register(
            "zkenv_token_requests",
            "Custodian requests by operation and outcome",
            metrics.requests.clone(),
        );
        registry.register(
            "zkenv_rate_limited",
            "Requests rejected by the per-client rate limit",
            metrics.rate_limited.clone(),
        );
        registry.register(
            "zkenv_live_pairs",
            "Token pairs currently held",
            metrics.live_pairs.clone(),
        );
        metrics
    }

    pub fn record(&self, op: &str, outcome: &str) {
        self.requests
            .get_or_create(&vec![
                ("op".to_string(), op.to_string()),
                ("outcome".to_string(), outcome.to_string()),
            ])
            .inc();
    }
}

pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let mut body = String::new();
    match encode(&mut body, &state.registry) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => {
            tracing::error!("metrics encode failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                e.to_string(),
            )
        }
    }
}
