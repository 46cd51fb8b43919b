//! End-to-end tests driving the full bridge against a local WebSocket
//! server and a recording bus publisher.

use crate::support::{
    accept_and_ack, bind_upstream, serve_until_closed, test_config, trade_frame, wait_for,
    RecordingPublisher,
};
use binance_bridge::breaker::CircuitState;
use binance_bridge::supervisor::{SessionState, Supervisor};
use futures_util::SinkExt;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

#[tokio::test]
async fn test_trade_frame_end_to_end() {
    let (listener, url) = bind_upstream().await;
    let server = tokio::spawn(async move {
        let mut ws = accept_and_ack(&listener).await;
        ws.send(Message::Text(trade_frame(42))).await.unwrap();
        serve_until_closed(ws).await;
    });

    let publisher = Arc::new(RecordingPublisher::new());
    let mut supervisor = Supervisor::with_publisher(test_config(&url), publisher.clone());
    let view = supervisor.view();
    supervisor.start().await.unwrap();

    assert!(wait_for(Duration::from_secs(5), || publisher.published_count() == 1).await);
    assert!(view.is_ready());

    let envelopes = publisher.envelopes();
    let envelope = &envelopes[0];
    assert_eq!(envelope["stream"], "btcusdt@trade");
    assert_eq!(
        envelope["data"],
        json!({
            "e": "trade",
            "E": 1700000000042u64,
            "s": "BTCUSDT",
            "t": 42,
            "p": "50000.00",
            "q": "0.001",
            "m": true
        })
    );
    assert_eq!(envelope["source"], "binance-websocket");
    assert_eq!(envelope["version"], "1.0");
    assert!(Uuid::parse_str(envelope["message_id"].as_str().unwrap()).is_ok());
    assert!(envelope["timestamp"].as_str().unwrap().ends_with('Z'));

    supervisor.stop(Duration::from_secs(2)).await;
    server.await.unwrap();

    let snap = view.snapshot();
    assert_eq!(snap.upstream_state, SessionState::Stopped);
    assert_eq!(
        snap.processed_total + snap.dropped_total + snap.parse_skipped,
        snap.frames_read
    );
}

#[tokio::test]
async fn test_unknown_event_is_skipped_and_connection_survives() {
    let (listener, url) = bind_upstream().await;
    let server = tokio::spawn(async move {
        let mut ws = accept_and_ack(&listener).await;
        ws.send(Message::Text(
            json!({"e": "bookTicker", "s": "BTCUSDT", "b": "50000"}).to_string(),
        ))
        .await
        .unwrap();
        ws.send(Message::Text(trade_frame(1))).await.unwrap();
        serve_until_closed(ws).await;
    });

    let publisher = Arc::new(RecordingPublisher::new());
    let mut supervisor = Supervisor::with_publisher(test_config(&url), publisher.clone());
    let view = supervisor.view();
    supervisor.start().await.unwrap();

    assert!(wait_for(Duration::from_secs(5), || publisher.published_count() == 1).await);
    let snap = view.snapshot();
    assert_eq!(snap.parse_skipped, 1);
    assert_eq!(snap.processed_total, 1);
    assert_eq!(snap.upstream_state, SessionState::Connected);

    supervisor.stop(Duration::from_secs(2)).await;
    server.await.unwrap();
}

#[tokio::test]
async fn test_reconnects_after_upstream_close() {
    let (listener, url) = bind_upstream().await;
    let server = tokio::spawn(async move {
        // First session is closed by the server immediately after the
        // handshake; the bridge must redial and resubscribe.
        let ws = accept_and_ack(&listener).await;
        drop(ws);

        let mut ws = accept_and_ack(&listener).await;
        ws.send(Message::Text(trade_frame(7))).await.unwrap();
        serve_until_closed(ws).await;
    });

    let publisher = Arc::new(RecordingPublisher::new());
    let mut supervisor = Supervisor::with_publisher(test_config(&url), publisher.clone());
    let view = supervisor.view();
    supervisor.start().await.unwrap();

    // Base delay is one second; recovery must complete well within five.
    assert!(wait_for(Duration::from_secs(5), || publisher.published_count() == 1).await);
    let snap = view.snapshot();
    assert!(snap.reconnect_attempts >= 1);
    assert_eq!(snap.upstream_state, SessionState::Connected);

    supervisor.stop(Duration::from_secs(2)).await;
    server.await.unwrap();
}

#[tokio::test]
async fn test_queue_overflow_drops_newest_without_blocking_reader() {
    const FRAMES: u64 = 1500;

    let (listener, url) = bind_upstream().await;
    let server = tokio::spawn(async move {
        let mut ws = accept_and_ack(&listener).await;
        for n in 0..FRAMES {
            ws.send(Message::Text(trade_frame(n))).await.unwrap();
        }
        serve_until_closed(ws).await;
    });

    let publisher = Arc::new(RecordingPublisher::gated());
    let mut config = test_config(&url);
    config.bridge.queue_capacity = 100;
    let mut supervisor = Supervisor::with_publisher(config, publisher.clone());
    let view = supervisor.view();
    supervisor.start().await.unwrap();

    // All frames are read even though every worker is stalled.
    assert!(wait_for(Duration::from_secs(10), || view.snapshot().frames_read == FRAMES).await);
    let snap = view.snapshot();
    assert_eq!(snap.processed_total, 0);
    assert!(snap.dropped_total >= 1000, "dropped {}", snap.dropped_total);
    assert!(snap.queue_size <= snap.queue_capacity);

    // Releasing the bus drains what the queue retained.
    publisher.release();
    assert!(wait_for(Duration::from_secs(5), || view.snapshot().processed_total >= 100).await);

    supervisor.stop(Duration::from_secs(2)).await;
    server.await.unwrap();

    let snap = view.snapshot();
    assert_eq!(
        snap.processed_total + snap.dropped_total + snap.parse_skipped,
        snap.frames_read
    );
}

#[tokio::test]
async fn test_stop_deadline_counts_undrained_frames_as_dropped() {
    const FRAMES: u64 = 50;

    let (listener, url) = bind_upstream().await;
    let server = tokio::spawn(async move {
        let mut ws = accept_and_ack(&listener).await;
        for n in 0..FRAMES {
            ws.send(Message::Text(trade_frame(n))).await.unwrap();
        }
        serve_until_closed(ws).await;
    });

    let publisher = Arc::new(RecordingPublisher::gated());
    let mut supervisor = Supervisor::with_publisher(test_config(&url), publisher.clone());
    let view = supervisor.view();
    supervisor.start().await.unwrap();

    // Both workers hold a frame; the rest sit in the queue.
    assert!(wait_for(Duration::from_secs(5), || {
        let snap = view.snapshot();
        snap.frames_read == FRAMES && snap.queue_size == FRAMES as usize - 2
    })
    .await);

    supervisor.stop(Duration::from_millis(200)).await;
    server.await.unwrap();

    let snap = view.snapshot();
    assert_eq!(snap.processed_total, 0);
    assert_eq!(snap.dropped_total, FRAMES);
    assert_eq!(
        snap.processed_total + snap.dropped_total + snap.parse_skipped,
        snap.frames_read
    );
}

#[tokio::test]
async fn test_bus_outage_opens_breaker_and_readiness_flips() {
    const FRAMES: u64 = 20;

    let (listener, url) = bind_upstream().await;
    let server = tokio::spawn(async move {
        let mut ws = accept_and_ack(&listener).await;
        for n in 0..FRAMES {
            ws.send(Message::Text(trade_frame(n))).await.unwrap();
        }
        serve_until_closed(ws).await;
    });

    let publisher = Arc::new(RecordingPublisher::new());
    publisher.set_failing(true);
    // A single worker keeps the failure sequence strictly ordered.
    let mut config = test_config(&url);
    config.bridge.worker_count = 1;
    let mut supervisor = Supervisor::with_publisher(config, publisher.clone());
    let view = supervisor.view();
    supervisor.start().await.unwrap();

    assert!(wait_for(Duration::from_secs(5), || {
        view.snapshot().dropped_total == FRAMES
    })
    .await);

    let snap = view.snapshot();
    assert_eq!(snap.circuit_states.bus.state, CircuitState::Open);
    assert_eq!(snap.publish_failures.disconnected, 5);
    assert_eq!(snap.publish_failures.breaker_open, FRAMES - 5);
    assert!(!view.is_ready());

    supervisor.stop(Duration::from_secs(2)).await;
    server.await.unwrap();
}
