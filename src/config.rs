//! Configuration types for binance-bridge
//!
//! Every option carries a default, so the bridge is runnable with zero
//! configuration. Values come from a TOML file and can be overridden by
//! CLI flags.

use serde::Deserialize;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub upstream: UpstreamConfig,
    pub bus: BusConfig,
    pub bridge: BridgeConfig,
    pub breaker: BreakerConfig,
    pub telemetry: TelemetryConfig,
    pub health: HealthConfig,
}

/// Upstream WebSocket connection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub url: String,
    /// Streams to subscribe to at connect time. Immutable once the session
    /// starts; duplicates are collapsed on load.
    pub streams: Vec<String>,
    pub reconnect_base_delay_secs: u64,
    pub reconnect_max_delay_secs: u64,
    pub max_reconnect_attempts: u32,
    pub ping_interval_secs: u64,
    pub handshake_timeout_secs: u64,
    pub close_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "wss://stream.binance.com:9443".to_string(),
            streams: vec![
                "btcusdt@trade".to_string(),
                "btcusdt@ticker".to_string(),
                "btcusdt@depth20@100ms".to_string(),
            ],
            reconnect_base_delay_secs: 5,
            reconnect_max_delay_secs: 60,
            max_reconnect_attempts: 10,
            ping_interval_secs: 30,
            handshake_timeout_secs: 10,
            close_timeout_secs: 10,
        }
    }
}

impl UpstreamConfig {
    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_base_delay_secs)
    }

    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_max_delay_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_secs(self.close_timeout_secs)
    }
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub url: String,
    pub subject: String,
    pub client_name: String,
    pub publish_timeout_secs: u64,
    pub flush_timeout_secs: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            subject: "binance.websocket.data".to_string(),
            client_name: "binance-bridge".to_string(),
            publish_timeout_secs: 5,
            flush_timeout_secs: 5,
        }
    }
}

impl BusConfig {
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_secs(self.flush_timeout_secs)
    }
}

/// Queue, worker pool and heartbeat configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub queue_capacity: usize,
    pub worker_count: usize,
    pub heartbeat_interval_secs: u64,
    pub shutdown_timeout_secs: u64,
    /// Queue-full warnings are logged at most once per this window.
    pub drop_warn_window_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 5000,
            worker_count: 5,
            heartbeat_interval_secs: 60,
            shutdown_timeout_secs: 30,
            drop_warn_window_ms: 1000,
        }
    }
}

impl BridgeConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn drop_warn_window(&self) -> Duration {
        Duration::from_millis(self.drop_warn_window_ms)
    }
}

/// Circuit breaker configuration, applied to both breakers
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_secs: 60,
        }
    }
}

impl BreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format
    #[default]
    Pretty,
    /// JSON format for log aggregation
    Json,
}

/// Health HTTP surface configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
        }
    }
}

/// Configuration rejected at startup
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("upstream.url must not be empty")]
    EmptyUpstreamUrl,
    #[error("upstream.streams must contain at least one stream")]
    EmptyStreams,
    #[error("bus.url must not be empty")]
    EmptyBusUrl,
    #[error("bus.subject must not be empty")]
    EmptySubject,
    #[error("bridge.queue_capacity must be at least 1")]
    ZeroQueueCapacity,
    #[error("bridge.worker_count must be at least 1")]
    ZeroWorkers,
    #[error("breaker.failure_threshold must be at least 1")]
    ZeroFailureThreshold,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Collapse duplicate streams, preserving first-seen order.
    pub fn normalize(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.upstream.streams.retain(|s| seen.insert(s.clone()));
    }

    /// Reject configurations the bridge cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upstream.url.trim().is_empty() {
            return Err(ConfigError::EmptyUpstreamUrl);
        }
        if self.upstream.streams.is_empty() {
            return Err(ConfigError::EmptyStreams);
        }
        if self.bus.url.trim().is_empty() {
            return Err(ConfigError::EmptyBusUrl);
        }
        if self.bus.subject.trim().is_empty() {
            return Err(ConfigError::EmptySubject);
        }
        if self.bridge.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if self.bridge.worker_count == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.breaker.failure_threshold == 0 {
            return Err(ConfigError::ZeroFailureThreshold);
        }
        Ok(())
    }
}
