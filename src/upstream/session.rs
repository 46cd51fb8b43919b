//! WebSocket session: dial, subscribe, read loop, keepalive

use super::types::{CloseReason, SessionError};
use crate::breaker::{BreakerError, CircuitBreaker};
use crate::config::UpstreamConfig;
use crate::envelope::derive_stream;
use crate::metrics::Metrics;
use crate::queue::{Frame, Producer};
use chrono::Utc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = Arc<Mutex<SplitSink<WsStream, Message>>>;

/// One established upstream connection with an acknowledged subscription.
pub struct UpstreamSession {
    reader: SplitStream<WsStream>,
    // Shared with the ping task; the reader only takes it for pong replies
    // and the close frame.
    writer: WsWriter,
    // Data frames that interleaved with the subscription ack; delivered
    // before anything read by `run`.
    pending: VecDeque<String>,
}

impl UpstreamSession {
    /// Dial and subscribe under the upstream circuit breaker.
    pub async fn connect(
        config: &UpstreamConfig,
        breaker: &CircuitBreaker,
    ) -> Result<Self, BreakerError<SessionError>> {
        breaker.call(|| Self::dial(config)).await
    }

    async fn dial(config: &UpstreamConfig) -> Result<Self, SessionError> {
        tracing::info!(url = %config.url, "Connecting to upstream WebSocket");

        let (ws_stream, _response) = connect_async(config.url.as_str())
            .await
            .map_err(|e| SessionError::Connect(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let id = Utc::now().timestamp_millis();
        let subscribe = serde_json::json!({
            "method": "SUBSCRIBE",
            "params": config.streams,
            "id": id,
        });
        write
            .send(Message::Text(subscribe.to_string()))
            .await
            .map_err(|e| SessionError::Subscribe(e.to_string()))?;

        // Wait for the matching ack; the server may interleave data frames,
        // which must not be lost.
        let mut pending = VecDeque::new();
        let deadline = tokio::time::Instant::now() + config.handshake_timeout();
        loop {
            let msg = tokio::time::timeout_at(deadline, read.next())
                .await
                .map_err(|_| {
                    SessionError::Subscribe("acknowledgment timed out".to_string())
                })?;

            match msg {
                Some(Ok(Message::Text(text))) => {
                    if is_subscribe_ack(&text, id) {
                        break;
                    }
                    pending.push_back(text);
                }
                Some(Ok(Message::Ping(data))) => {
                    write
                        .send(Message::Pong(data))
                        .await
                        .map_err(|e| SessionError::Subscribe(e.to_string()))?;
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(SessionError::Subscribe(
                        "connection closed during handshake".to_string(),
                    ));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(SessionError::Connect(e.to_string())),
            }
        }

        tracing::info!(streams = ?config.streams, "Subscribed to upstream streams");

        Ok(Self {
            reader: read,
            writer: Arc::new(Mutex::new(write)),
            pending,
        })
    }

    /// Read frames until error, close or shutdown, handing each parsed frame
    /// to the queue producer. Frames are emitted in upstream read order.
    pub async fn run(
        mut self,
        producer: &mut Producer,
        config: &UpstreamConfig,
        metrics: Arc<Metrics>,
        mut shutdown: watch::Receiver<bool>,
    ) -> CloseReason {
        let mut ping_task = spawn_ping_task(
            Arc::clone(&self.writer),
            config.ping_interval(),
            Arc::clone(&metrics),
            shutdown.clone(),
        );

        while let Some(text) = self.pending.pop_front() {
            handle_text(&text, producer, config, &metrics);
        }

        let reason = loop {
            tokio::select! {
                msg = self.reader.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_text(&text, producer, config, &metrics);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let mut writer = self.writer.lock().await;
                        if let Err(e) = writer.send(Message::Pong(data)).await {
                            break CloseReason::Error(SessionError::Read(e.to_string()));
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("Upstream sent close frame");
                        break CloseReason::RemoteClosed;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        break CloseReason::Error(SessionError::Read(e.to_string()));
                    }
                    None => {
                        break CloseReason::Error(SessionError::Read(
                            "stream ended unexpectedly".to_string(),
                        ));
                    }
                },
                result = &mut ping_task => {
                    break match result {
                        Ok(Ok(())) => CloseReason::Shutdown,
                        Ok(Err(e)) => CloseReason::Error(e),
                        Err(e) => CloseReason::Error(SessionError::Ping(e.to_string())),
                    };
                }
                _ = shutdown.changed() => {
                    break CloseReason::Shutdown;
                }
            }
        };

        ping_task.abort();
        if matches!(reason, CloseReason::Shutdown) {
            self.close(config.close_timeout()).await;
        }
        reason
    }

    /// Send a close frame with normal status and drain until the peer
    /// acknowledges or the timeout elapses.
    pub async fn close(&mut self, timeout: Duration) {
        let close = Message::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "shutting down".into(),
        }));
        {
            let mut writer = self.writer.lock().await;
            if let Err(e) = writer.send(close).await {
                tracing::debug!(error = %e, "Failed to send close frame");
                return;
            }
        }

        let drained = tokio::time::timeout(timeout, async {
            while let Some(msg) = self.reader.next().await {
                if matches!(msg, Ok(Message::Close(_)) | Err(_)) {
                    break;
                }
            }
        })
        .await;

        if drained.is_err() {
            tracing::debug!("Close handshake timed out");
        }
    }
}

/// Parse one text frame and hand it to the queue. Frames that cannot be
/// attributed to a stream are skipped without disturbing the connection.
fn handle_text(text: &str, producer: &mut Producer, config: &UpstreamConfig, metrics: &Metrics) {
    metrics.inc_frames_read();
    metrics.mark_message();

    let value = match serde_json::from_str::<Value>(text) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to parse upstream frame");
            metrics.inc_parse_skipped();
            return;
        }
    };

    match derive_stream(value, &config.streams) {
        Some((stream, payload)) => {
            if !producer.enqueue(Frame { stream, payload }) {
                metrics.inc_dropped();
            }
        }
        None => {
            tracing::warn!("Skipping frame with underivable stream name");
            metrics.inc_parse_skipped();
        }
    }
}

/// Keepalive task. Exits Ok on shutdown, Err when a ping could not be sent;
/// the read loop treats the latter as a connection failure.
fn spawn_ping_task(
    writer: WsWriter,
    interval: Duration,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<Result<(), SessionError>> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let mut writer = writer.lock().await;
                    writer
                        .send(Message::Ping(Vec::new()))
                        .await
                        .map_err(|e| SessionError::Ping(e.to_string()))?;
                    metrics.mark_ping();
                }
                _ = shutdown.changed() => return Ok(()),
            }
        }
    })
}

fn is_subscribe_ack(text: &str, id: i64) -> bool {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => {
            value.get("id").and_then(Value::as_i64) == Some(id)
                && value.get("result").map_or(false, Value::is_null)
        }
        Err(_) => false,
    }
}
