//! zkenvd: reference token custodian for zkenv
//!
//! Holds token pairs in memory and serves the JSON API the zkenv client
//! speaks. It never sees keys, PINs or values; only the two token halves.

pub mod metrics;
pub mod rate_limit;
pub mod routes;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use prometheus_client::registry::Registry;
use zkenv_core::config::ServerConfig;
use zkenv_core::store::TokenStore;
use zkenv_core::{ZkenvError, ZkenvResult};

use crate::metrics::CustodianMetrics;
use crate::rate_limit::RateLimiter;

/// Shared handler state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    store: Arc<Mutex<TokenStore>>,
    config: Arc<ServerConfig>,
    limiter: Arc<RateLimiter>,
    metrics: CustodianMetrics,
    registry: Arc<Registry>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let mut registry = Registry::default();
        let metrics = CustodianMetrics::new(&mut registry);
        let limiter = RateLimiter::new(
            config.rate_limit_max,
            Duration::from_secs(config.rate_limit_window_secs),
        );
        Self {
            store: Arc::new(Mutex::new(TokenStore::new())),
            config: Arc::new(config),
            limiter: Arc::new(limiter),
            metrics,
            registry: Arc::new(registry),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Requested lifetime, defaulted and clamped to `1..=max_ttl_hours`.
    pub fn ttl_hours(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.config.default_ttl_hours)
            .clamp(1, self.config.max_ttl_hours.max(1))
    }

    pub fn live_pairs(&self) -> usize {
        self.store.lock().map(|s| s.len()).unwrap_or(0)
    }

    fn with_store<T>(&self, f: impl FnOnce(&mut TokenStore) -> ZkenvResult<T>) -> ZkenvResult<T> {
        let mut store = self
            .store
            .lock()
            .map_err(|_| ZkenvError::ServiceUnavailable("token store lock poisoned".into()))?;
        let result = f(&mut store);
        self.metrics.live_pairs.set(store.len() as i64);
        result
    }
}

/// Build the custodian router. Issue and resolve routes are rate limited.
pub fn app(state: AppState) -> Router {
    let limited = || middleware::from_fn_with_state(state.clone(), rate_limit::rate_limit);

    let mut router = Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/tokens", post(routes::issue).route_layer(limited()))
        .route("/api/tokens/get", post(routes::resolve_by_b).route_layer(limited()))
        .route("/api/decrypt", post(routes::resolve_by_a).route_layer(limited()))
        .route("/api/tokens/delete", post(routes::delete));

    if state.config.metrics {
        router = router.route("/metrics", get(metrics::metrics_handler));
    }
    router.with_state(state)
}

/// Bind `config.listen` and serve until ctrl-c.
pub async fn serve(config: ServerConfig) -> Result<()> {
    let addr = config.listen.clone();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("bind {addr}: {e}"))?;
    tracing::info!(addr = %addr, "zkenvd: listening on /api");

    axum::serve(
        listener,
        app(AppState::new(config)).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("zkenvd: shutting down");
    })
    .await
    .map_err(|e| anyhow::anyhow!("zkenvd server: {e}"))
}
