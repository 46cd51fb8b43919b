//! Shared test fixtures: a recording bus publisher and a local WebSocket
//! server speaking the upstream subscribe protocol.

use async_trait::async_trait;
use binance_bridge::bus::{BusError, BusState, Publisher, PublishError};
use binance_bridge::config::Config;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

/// Bus publisher double. Records everything; can be switched to fail (which
/// also reports a disconnected state) or gated so publishes block until
/// released.
pub struct RecordingPublisher {
    published: Mutex<Vec<Bytes>>,
    failing: AtomicBool,
    gate: Option<Semaphore>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            gate: None,
        }
    }

    /// A publisher whose `publish` blocks until `release` is called.
    pub fn gated() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            gate: Some(Semaphore::new(0)),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    pub fn published_count(&self) -> usize {
        self.published.lock().len()
    }

    pub fn envelopes(&self) -> Vec<Value> {
        self.published
            .lock()
            .iter()
            .map(|bytes| serde_json::from_slice(bytes).unwrap())
            .collect()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, _subject: &str, payload: Bytes) -> Result<(), PublishError> {
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.map_err(|_| PublishError::Disconnected)?;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(PublishError::Disconnected);
        }
        self.published.lock().push(payload);
        Ok(())
    }

    fn state(&self) -> BusState {
        if self.failing.load(Ordering::SeqCst) {
            BusState::Disconnected
        } else {
            BusState::Connected
        }
    }

    async fn close(&self, _deadline: Duration) -> Result<(), BusError> {
        Ok(())
    }
}

/// Bind a local WebSocket endpoint and return it with its `ws://` URL.
pub async fn bind_upstream() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

/// Accept one connection, verify the subscription request and acknowledge it.
pub async fn accept_and_ack(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = listener.accept().await.unwrap();
    let mut ws = accept_async(stream).await.unwrap();

    let msg = ws.next().await.unwrap().unwrap();
    let request: Value = serde_json::from_str(msg.to_text().unwrap()).unwrap();
    assert_eq!(request["method"], "SUBSCRIBE");
    assert!(request["params"].as_array().is_some());
    let id = request["id"].as_i64().unwrap();

    ws.send(Message::Text(json!({"result": null, "id": id}).to_string()))
        .await
        .unwrap();
    ws
}

/// Keep the server side alive, answering pings, until the client closes.
pub async fn serve_until_closed(mut ws: WebSocketStream<TcpStream>) {
    loop {
        match ws.next().await {
            Some(Ok(Message::Ping(data))) => {
                if ws.send(Message::Pong(data)).await.is_err() {
                    break;
                }
            }
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
            _ => {}
        }
    }
}

/// Bridge configuration pointed at a local upstream, tuned for fast tests.
pub fn test_config(url: &str) -> Config {
    let mut config = Config::default();
    config.upstream.url = url.to_string();
    config.upstream.reconnect_base_delay_secs = 1;
    config.upstream.handshake_timeout_secs = 5;
    config.upstream.close_timeout_secs = 1;
    config.bridge.heartbeat_interval_secs = 3600;
    config.bridge.worker_count = 2;
    config
}

/// Poll `condition` until it holds or the deadline elapses.
pub async fn wait_for(deadline: Duration, condition: impl Fn() -> bool) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}

pub fn trade_frame(n: u64) -> String {
    json!({
        "e": "trade",
        "E": 1700000000000u64 + n,
        "s": "BTCUSDT",
        "t": n,
        "p": "50000.00",
        "q": "0.001",
        "m": true
    })
    .to_string()
}
