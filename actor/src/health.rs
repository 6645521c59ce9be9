//! Health check HTTP server for container probes.
//!
//! `/health` is liveness, `/ready` is readiness and `/metrics` serves the
//! Prometheus registry from [`crate::metrics`].

use axum::http::StatusCode;
use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::metrics;

/// Liveness fails when no game finished within this window.
pub const PROGRESS_TIMEOUT_SECS: u64 = 300;

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Shared health state between the orchestrator and the health server.
#[derive(Debug, Clone)]
pub struct HealthState {
    /// Set once the evaluator and store are initialised.
    ready: Arc<AtomicBool>,
    /// Cleared when a run fails fatally.
    healthy: Arc<AtomicBool>,
    /// Unix seconds of the last finished game.
    last_game_time: Arc<AtomicU64>,
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(false)),
            healthy: Arc::new(AtomicBool::new(true)),
            last_game_time: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
        info!("Actor marked as ready");
    }

    pub fn set_unhealthy(&self) {
        self.healthy.store(false, Ordering::SeqCst);
        error!("Actor marked as unhealthy");
    }

    pub fn record_game_complete(&self) {
        self.last_game_time.store(unix_now(), Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    /// True if a game finished within `timeout_secs`, or none has finished yet.
    pub fn is_making_progress(&self, timeout_secs: u64) -> bool {
        let last = self.last_game_time.load(Ordering::SeqCst);
        if last == 0 {
            return true;
        }
        unix_now().saturating_sub(last) < timeout_secs
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

fn router(state: HealthState) -> Router {
    Router::new()
        .route(
            "/health",
            get({
                let state = state.clone();
                move || health_handler(state.clone())
            }),
        )
        .route(
            "/ready",
            get({
                let state = state.clone();
                move || ready_handler(state.clone())
            }),
        )
        .route("/metrics", get(metrics_handler))
}

/// Bind the health server and serve it on a background task.
///
/// Returns the bound address, which differs from `port` only when `port` is 0.
pub async fn start_health_server(port: u16, state: HealthState) -> anyhow::Result<SocketAddr> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    let addr = listener.local_addr()?;
    info!(%addr, "Health server listening");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router(state)).await {
            warn!(error = %e, "Health server stopped");
        }
    });
    Ok(addr)
}

async fn health_handler(state: HealthState) -> StatusCode {
    if state.is_healthy() && state.is_making_progress(PROGRESS_TIMEOUT_SECS) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn ready_handler(state: HealthState) -> StatusCode {
    if state.is_ready() && state.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn metrics_handler() -> (StatusCode, String) {
    metrics::update_memory_metrics();
    match metrics::encode_metrics() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
