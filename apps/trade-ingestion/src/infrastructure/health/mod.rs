//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, per-symbol connection status, and
//! Prometheus metrics.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status with every subscription
//! - `GET /healthz` - Kubernetes liveness check (simple OK)
//! - `GET /readyz` - Kubernetes readiness check (at least one symbol streaming)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::IngestionHub;
use crate::domain::subscription::{ConnectionState, SubscriptionSnapshot};
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Symbols currently streaming.
    pub streaming: usize,
    /// Per-symbol state, in subscription order.
    pub subscriptions: Vec<SubscriptionSnapshot>,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every symbol is streaming.
    Healthy,
    /// Some symbols are streaming.
    Degraded,
    /// No symbol is streaming.
    Unhealthy,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    hub: Arc<IngestionHub>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(version: String, hub: Arc<IngestionHub>) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            hub,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");
        self.serve(listener).await
    }

    async fn serve(self, listener: TcpListener) -> Result<(), HealthServerError> {
        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.hub.streaming_count() > 0 {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let subscriptions = state.hub.subscriptions();
    let streaming = subscriptions
        .iter()
        .filter(|s| s.state == ConnectionState::Streaming)
        .count();

    HealthResponse {
        status: determine_health_status(streaming, subscriptions.len()),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        streaming,
        subscriptions,
    }
}

fn determine_health_status(streaming: usize, total: usize) -> HealthStatus {
    match (streaming, total) {
        (0, _) => HealthStatus::Unhealthy,
        (s, t) if s >= t => HealthStatus::Healthy,
        _ => HealthStatus::Degraded,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use super::*;
    use crate::application::ports::{ScriptedConnector, ScriptedDial};
    use crate::application::services::{FixedBackoff, HubConfig, SupervisorContext};
    use crate::infrastructure::binance::TradeDecoder;

    const BASE: &str = "ws://upstream/ws";

    fn hub(connector: ScriptedConnector) -> Arc<IngestionHub> {
        let context = SupervisorContext {
            connector: Arc::new(connector),
            decoder: Arc::new(TradeDecoder::default()),
            backoff: Arc::new(FixedBackoff::default()),
        };
        let config = HubConfig {
            stream_base_url: BASE.to_string(),
            queue_capacity: 10,
        };
        Arc::new(IngestionHub::new(config, context, &CancellationToken::new()).unwrap())
    }

    async fn wait_until(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    async fn get(port: u16, path: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"degraded\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn status_from_streaming_count() {
        assert_eq!(determine_health_status(3, 3), HealthStatus::Healthy);
        assert_eq!(determine_health_status(1, 3), HealthStatus::Degraded);
        assert_eq!(determine_health_status(0, 3), HealthStatus::Unhealthy);
        assert_eq!(determine_health_status(0, 0), HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn response_lists_subscriptions_in_order() {
        let connector = ScriptedConnector::new()
            .script("ws://upstream/ws/btcusdt@trade", [ScriptedDial::Connect(vec![])]);
        let hub = hub(connector);
        hub.subscribe("BTCUSDT").unwrap();
        hub.subscribe("ETHUSDT").unwrap();

        wait_until(|| {
            let subs = hub.subscriptions();
            subs[0].state == ConnectionState::Streaming
                && subs[1].state == ConnectionState::Connecting
        })
        .await;

        let state = HealthServerState::new("1.2.3".to_string(), hub.clone());
        let response = build_health_response(&state);

        assert_eq!(response.status, HealthStatus::Degraded);
        assert_eq!(response.version, "1.2.3");
        assert_eq!(response.streaming, 1);
        let symbols: Vec<_> = response
            .subscriptions
            .iter()
            .map(|s| s.symbol.clone())
            .collect();
        assert_eq!(symbols, vec!["BTCUSDT", "ETHUSDT"]);
        assert_eq!(response.subscriptions[0].state, ConnectionState::Streaming);
        assert_eq!(response.subscriptions[1].state, ConnectionState::Connecting);

        hub.close();
    }

    #[tokio::test]
    async fn liveness_and_readiness_follow_streaming_state() {
        let hub = hub(ScriptedConnector::new());
        hub.subscribe("BTCUSDT").unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let cancel = CancellationToken::new();
        let state = Arc::new(HealthServerState::new("0.1.0".to_string(), hub.clone()));
        let server = tokio::spawn(HealthServer::new(port, state, cancel.clone()).serve(listener));

        assert!(get(port, "/healthz").await.starts_with("HTTP/1.1 200"));
        assert!(get(port, "/readyz").await.starts_with("HTTP/1.1 503"));

        let health = get(port, "/health").await;
        assert!(health.starts_with("HTTP/1.1 503"));
        assert!(health.contains("\"status\":\"unhealthy\""));
        assert!(health.contains("\"symbol\":\"BTCUSDT\""));

        cancel.cancel();
        server.await.unwrap().unwrap();
        hub.close();
    }
}
