//! Health check endpoints and Prometheus metrics server
//!
//! HTTP endpoints for liveness, metrics, and a core-state snapshot,
//! served with Axum alongside the request-handling tasks.

use crate::error::Result;
use crate::metrics::collector::MetricsCollector;
use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Snapshot of core state for the stats endpoint
#[derive(Debug, Clone, Default, Serialize)]
pub struct CoreStats {
    pub users_total: usize,
    pub pool_size: usize,
    pub active_sessions: usize,
    pub active_board_games: usize,
    pub active_guess_games: usize,
    pub uptime_seconds: u64,
}

/// Source of core-state snapshots, implemented by the service layer
pub trait StatsSource: Send + Sync {
    fn snapshot(&self) -> Result<CoreStats>;
}

/// Health server configuration
#[derive(Debug, Clone)]
pub struct HealthServerConfig {
    pub port: u16,
    pub host: String,
}

impl Default for HealthServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// Shared state for the health server
#[derive(Clone)]
struct HealthServerState {
    metrics: Arc<MetricsCollector>,
    stats: Arc<dyn StatsSource>,
}

/// HTTP server exposing `/health`, `/metrics`, and `/stats`
pub struct HealthServer {
    config: HealthServerConfig,
    state: HealthServerState,
    shutdown_tx: broadcast::Sender<()>,
}

impl HealthServer {
    pub fn new(
        config: HealthServerConfig,
        metrics: Arc<MetricsCollector>,
        stats: Arc<dyn StatsSource>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            state: HealthServerState { metrics, stats },
            shutdown_tx,
        }
    }

    /// Bind and serve until a shutdown signal arrives
    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid health server address")?;

        let app = self.create_router();
        let listener = TcpListener::bind(addr).await?;
        info!("Health server listening on http://{}", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Health server shutdown signal received");
            })
            .await?;

        info!("Health server stopped");
        Ok(())
    }

    fn create_router(&self) -> Router {
        Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/stats", get(stats_handler))
            .with_state(self.state.clone())
    }

    pub fn stop(&self) {
        if self.shutdown_tx.send(()).is_err() {
            warn!("Health server was not running when stop was requested");
        }
    }
}

async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "service": "duet",
        "version": crate::VERSION,
    }))
}

async fn health_handler(State(state): State<HealthServerState>) -> Response {
    match state.stats.snapshot() {
        Ok(stats) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "active_sessions": stats.active_sessions,
                "pool_size": stats.pool_size,
                "uptime_seconds": stats.uptime_seconds,
            })),
        )
            .into_response(),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "degraded",
                "error": err.to_string(),
            })),
        )
            .into_response(),
    }
}

async fn metrics_handler(State(state): State<HealthServerState>) -> Response {
    match state.metrics.export() {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("metrics encoding failed: {}", err),
        )
            .into_response(),
    }
}

async fn stats_handler(State(state): State<HealthServerState>) -> Response {
    match state.stats.snapshot() {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response(),
    }
}
