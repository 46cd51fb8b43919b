//! Health surface handlers against a fresh (not started) bridge

use axum::body::Body;
use axum::http::{Request, StatusCode};
use binance_bridge::config::Config;
use binance_bridge::health::router;
use binance_bridge::supervisor::Supervisor;
use serde_json::Value;
use tower::ServiceExt;

async fn get(path: &str) -> (StatusCode, Value) {
    let supervisor = Supervisor::new(Config::default());
    let app = router(supervisor.view());

    let response = app
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_healthz_reports_healthy_before_any_failure() {
    let (status, body) = get("/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "binance-bridge");
}

#[tokio::test]
async fn test_ready_is_unavailable_while_disconnected() {
    let (status, body) = get("/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "not_ready");
    assert_eq!(body["upstream_state"], "disconnected");
    assert_eq!(body["bus_state"], "disconnected");
}

#[tokio::test]
async fn test_metrics_exposes_the_snapshot() {
    let (status, body) = get("/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["processed_total"], 0);
    assert_eq!(body["queue_capacity"], 5000);
    assert_eq!(body["upstream_state"], "disconnected");
    assert_eq!(body["circuit_states"]["upstream"]["state"], "closed");
    assert_eq!(body["circuit_states"]["bus"]["state"], "closed");
}

#[tokio::test]
async fn test_root_describes_the_service() {
    let (status, body) = get("/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "binance-bridge");
    assert!(body["endpoints"]
        .as_array()
        .unwrap()
        .contains(&Value::String("/metrics".to_string())));
}
