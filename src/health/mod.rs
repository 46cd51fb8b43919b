//! Health and metrics HTTP surface
//!
//! Trivial views over the core's snapshot: the handlers read the
//! `BridgeView` and never mutate anything.

use crate::metrics::MetricsSnapshot;
use crate::supervisor::BridgeView;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::SocketAddr;
use tokio::sync::watch;

const SERVICE_NAME: &str = "binance-bridge";

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    timestamp: DateTime<Utc>,
    uptime_seconds: f64,
}

#[derive(Debug, Serialize)]
struct ReadyResponse {
    status: &'static str,
    upstream_state: String,
    bus_state: String,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct ServiceInfo {
    service: &'static str,
    version: &'static str,
    description: &'static str,
    endpoints: [&'static str; 3],
}

/// Serve the health surface until the shutdown signal fires.
pub async fn serve(
    port: u16,
    view: BridgeView,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Health server listening");

    axum::serve(listener, router(view))
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;
    Ok(())
}

pub fn router(view: BridgeView) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .with_state(view)
}

async fn healthz(State(view): State<BridgeView>) -> (StatusCode, Json<HealthResponse>) {
    let healthy = view.is_healthy();
    let snap = view.snapshot();
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" },
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now(),
        uptime_seconds: snap.uptime_seconds,
    };
    (status, Json(body))
}

async fn ready(State(view): State<BridgeView>) -> (StatusCode, Json<ReadyResponse>) {
    let ready = view.is_ready();
    let snap = view.snapshot();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = ReadyResponse {
        status: if ready { "ready" } else { "not_ready" },
        upstream_state: snap.upstream_state.to_string(),
        bus_state: snap.bus_state.to_string(),
        timestamp: Utc::now(),
    };
    (status, Json(body))
}

async fn metrics(State(view): State<BridgeView>) -> Json<MetricsSnapshot> {
    Json(view.snapshot())
}

async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        description: "Bridges Binance WebSocket market data onto NATS",
        endpoints: ["/healthz", "/ready", "/metrics"],
    })
}
