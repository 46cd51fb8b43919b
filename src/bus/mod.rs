//! Bus publisher owning the single NATS connection
//!
//! Publishes are fire-and-forget with classified errors; retries are the
//! caller's policy (the worker drops after one attempt).

use crate::config::BusConfig;
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::time::Duration;

/// Bus connection state as seen by readiness checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BusState {
    Connected,
    Pending,
    Disconnected,
}

impl std::fmt::Display for BusState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BusState::Connected => write!(f, "connected"),
            BusState::Pending => write!(f, "pending"),
            BusState::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Classified publish failure
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("bus connection is down")]
    Disconnected,
    #[error("publish timed out after {0:?}")]
    Timeout(Duration),
    #[error("publish failed: {0}")]
    Other(String),
}

/// Connect/close failure
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("failed to connect to bus: {0}")]
    Connect(String),
    #[error("flush failed: {0}")]
    Flush(String),
}

/// Seam between the worker pool and the concrete bus client.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish one message. Safe for concurrent callers; per-caller
    /// submission order is preserved.
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), PublishError>;

    fn state(&self) -> BusState;

    /// Flush in-flight publishes within the deadline.
    async fn close(&self, deadline: Duration) -> Result<(), BusError>;
}

/// NATS-backed publisher. The underlying client maintains its own
/// reconnection; state changes surface through the event callback and
/// `state()`.
pub struct NatsPublisher {
    client: async_nats::Client,
    publish_timeout: Duration,
}

impl NatsPublisher {
    pub async fn connect(config: &BusConfig) -> Result<Self, BusError> {
        let client = async_nats::ConnectOptions::new()
            .name(&config.client_name)
            .event_callback(|event| async move {
                match event {
                    async_nats::Event::Disconnected => {
                        tracing::warn!("Bus connection lost, client reconnecting");
                    }
                    async_nats::Event::Connected => {
                        tracing::info!("Bus connection re-established");
                    }
                    other => {
                        tracing::debug!(event = %other, "Bus client event");
                    }
                }
            })
            .connect(config.url.as_str())
            .await
            .map_err(|e| BusError::Connect(e.to_string()))?;

        tracing::info!(url = %config.url, "Connected to bus");

        Ok(Self {
            client,
            publish_timeout: config.publish_timeout(),
        })
    }
}

#[async_trait]
impl Publisher for NatsPublisher {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), PublishError> {
        if self.client.connection_state() == async_nats::connection::State::Disconnected {
            return Err(PublishError::Disconnected);
        }

        let publish = self.client.publish(subject.to_string(), payload);
        match tokio::time::timeout(self.publish_timeout, publish).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(PublishError::Other(e.to_string())),
            Err(_) => Err(PublishError::Timeout(self.publish_timeout)),
        }
    }

    fn state(&self) -> BusState {
        match self.client.connection_state() {
            async_nats::connection::State::Connected => BusState::Connected,
            async_nats::connection::State::Pending => BusState::Pending,
            async_nats::connection::State::Disconnected => BusState::Disconnected,
        }
    }

    async fn close(&self, deadline: Duration) -> Result<(), BusError> {
        match tokio::time::timeout(deadline, self.client.flush()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(BusError::Flush(e.to_string())),
            Err(_) => Err(BusError::Flush(format!(
                "flush did not complete within {:?}",
                deadline
            ))),
        }
    }
}
