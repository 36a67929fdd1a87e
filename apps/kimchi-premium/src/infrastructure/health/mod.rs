//! Health Check, Metrics and Market List Endpoint
//!
//! HTTP endpoint for health checks, connection status reporting, Prometheus
//! metrics and the ranked market list.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /readyz` - Readiness probe (both feeds connected)
//! - `GET /metrics` - Prometheus metrics in text format
//! - `GET /markets` - Ordered enriched records as JSON

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::ports::FeedStatus;
use crate::application::services::MarketEngine;
use crate::domain::ticker::Exchange;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Engine version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Per-exchange connection status.
    pub feeds: Vec<FeedInfo>,
    /// Market state summary.
    pub market: MarketInfo,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Both feeds connected.
    Healthy,
    /// One feed connected.
    Degraded,
    /// No feed connected.
    Unhealthy,
}

/// Individual feed status.
#[derive(Debug, Clone, Serialize)]
pub struct FeedInfo {
    /// Whether this feed is connected.
    pub connected: bool,
    /// Full connection status.
    #[serde(flatten)]
    pub status: FeedStatus,
}

impl From<FeedStatus> for FeedInfo {
    fn from(status: FeedStatus) -> Self {
        Self {
            connected: status.is_ready(),
            status,
        }
    }
}

/// Market state summary.
#[derive(Debug, Clone, Serialize)]
pub struct MarketInfo {
    /// Enriched records tracked.
    pub records: usize,
    /// Markets in the ordered list.
    pub ordered: usize,
    /// Latest KRW per USD rate.
    pub fx_rate: Option<Decimal>,
    /// Age of the FX rate in seconds.
    pub fx_age_secs: Option<i64>,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
#[derive(Debug)]
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    engine: Arc<MarketEngine>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(version: String, engine: Arc<MarketEngine>) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            engine,
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

    /// Routes served by the health server.
    pub fn router(state: Arc<HealthServerState>) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/healthz", get(liveness_handler))
            .route("/readyz", get(readiness_handler))
            .route("/metrics", get(metrics_handler))
            .route("/markets", get(markets_handler))
            .with_state(state)
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = Self::router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
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
    if state.engine.is_ready() {
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

async fn markets_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    Json(state.engine.store().ordered_records())
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let now = Utc::now();
    let feeds: Vec<FeedInfo> = Exchange::all()
        .iter()
        .map(|e| FeedInfo::from(state.engine.feed_status(*e)))
        .collect();

    let summary = state.engine.store().summary();

    HealthResponse {
        status: determine_health_status(&feeds),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: now,
        feeds,
        market: MarketInfo {
            records: summary.records,
            ordered: summary.ordered,
            fx_rate: summary.fx_rate.map(|r| r.base_price),
            fx_age_secs: summary.fx_rate.map(|r| r.age(now).num_seconds()),
        },
    }
}

fn determine_health_status(feeds: &[FeedInfo]) -> HealthStatus {
    let connected = feeds.iter().filter(|f| f.connected).count();

    match connected {
        0 => HealthStatus::Unhealthy,
        n if n == feeds.len() => HealthStatus::Healthy,
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
    use super::*;
    use crate::application::ports::ConnectionState;

    fn feed(exchange: Exchange, state: ConnectionState) -> FeedInfo {
        FeedInfo::from(FeedStatus {
            exchange,
            state,
            messages_received: 10,
            malformed_messages: 1,
            reconnects: 0,
        })
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn determine_status() {
        let up = feed(Exchange::Upbit, ConnectionState::Connected);
        let binance_up = feed(Exchange::Binance, ConnectionState::Connected);
        let binance_down = feed(Exchange::Binance, ConnectionState::AwaitingReconnect);
        let upbit_down = feed(Exchange::Upbit, ConnectionState::Connecting);

        assert_eq!(
            determine_health_status(&[up.clone(), binance_up]),
            HealthStatus::Healthy
        );
        assert_eq!(
            determine_health_status(&[up, binance_down.clone()]),
            HealthStatus::Degraded
        );
        assert_eq!(
            determine_health_status(&[upbit_down, binance_down]),
            HealthStatus::Unhealthy
        );
    }

    #[test]
    fn feed_info_flattens_status() {
        let info = feed(Exchange::Binance, ConnectionState::AwaitingReconnect);
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["exchange"], "binance");
        assert_eq!(value["state"], "awaiting_reconnect");
        assert_eq!(value["connected"], false);
        assert_eq!(value["malformed_messages"], 1);
    }
}
