//! Health and Metrics HTTP Server
//!
//! Serves on the configured bind address:
//! - `/live`    — Liveness probe: 200 while the process runs
//! - `/ready`   — Readiness probe: 503 during graceful shutdown
//! - `/metrics` — Prometheus text exposition

use std::sync::Arc;

use anyhow::Result;
use axum::{extract::State, http::StatusCode, routing::get, Router};
use tokio::sync::watch;
use tracing::info;

use super::MetricsRegistry;

#[derive(Clone)]
struct ServerState {
    ready_rx: watch::Receiver<bool>,
    metrics: Arc<MetricsRegistry>,
}

/// Serve health and metrics endpoints until the process exits.
pub async fn serve(
    bind_address: String,
    ready_rx: watch::Receiver<bool>,
    metrics: Arc<MetricsRegistry>,
) -> Result<()> {
    let state = ServerState { ready_rx, metrics };

    let app = Router::new()
        .route("/live", get(|| async { StatusCode::OK }))
        .route(
            "/ready",
            get(|State(state): State<ServerState>| async move {
                if *state.ready_rx.borrow() {
                    StatusCode::OK
                } else {
                    StatusCode::SERVICE_UNAVAILABLE
                }
            }),
        )
        .route(
            "/metrics",
            get(|State(state): State<ServerState>| async move { state.metrics.render() }),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!(address = %bind_address, "Health/metrics server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
