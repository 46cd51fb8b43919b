//! Core-owned operational counters and the read-only snapshot
//!
//! All counters are atomics updated from the hot path. Readers (heartbeat,
//! health surface) take a snapshot by reading each field once; exact
//! cross-field consistency is not required.

use crate::breaker::BreakerSnapshot;
use crate::bus::{BusState, PublishError};
use crate::supervisor::SessionState;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

pub struct Metrics {
    processed_total: AtomicU64,
    dropped_total: AtomicU64,
    parse_skipped: AtomicU64,
    frames_read: AtomicU64,
    publish_disconnected: AtomicU64,
    publish_timeout: AtomicU64,
    publish_other: AtomicU64,
    publish_breaker_open: AtomicU64,
    reconnect_attempts: AtomicU64,
    // Frames dequeued but not yet accounted as processed or dropped.
    in_flight: AtomicU64,
    // Epoch milliseconds; 0 means "never".
    last_message_at_ms: AtomicI64,
    last_ping_at_ms: AtomicI64,
    started_at: Instant,
    queue_depth: Arc<AtomicUsize>,
    queue_capacity: usize,
}

impl Metrics {
    pub fn new(queue_depth: Arc<AtomicUsize>, queue_capacity: usize) -> Self {
        Self {
            processed_total: AtomicU64::new(0),
            dropped_total: AtomicU64::new(0),
            parse_skipped: AtomicU64::new(0),
            frames_read: AtomicU64::new(0),
            publish_disconnected: AtomicU64::new(0),
            publish_timeout: AtomicU64::new(0),
            publish_other: AtomicU64::new(0),
            publish_breaker_open: AtomicU64::new(0),
            reconnect_attempts: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
            last_message_at_ms: AtomicI64::new(0),
            last_ping_at_ms: AtomicI64::new(0),
            started_at: Instant::now(),
            queue_depth,
            queue_capacity,
        }
    }

    pub fn inc_processed(&self) {
        self.processed_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_dropped(&self) {
        self.dropped_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_dropped(&self, count: u64) {
        self.dropped_total.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_parse_skipped(&self) {
        self.parse_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_frames_read(&self) {
        self.frames_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reconnect_attempts(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_publish_breaker_open(&self) {
        self.publish_breaker_open.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_in_flight(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_in_flight(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn record_publish_error(&self, error: &PublishError) {
        let counter = match error {
            PublishError::Disconnected => &self.publish_disconnected,
            PublishError::Timeout(_) => &self.publish_timeout,
            PublishError::Other(_) => &self.publish_other,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mark_message(&self) {
        self.last_message_at_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn mark_ping(&self) {
        self.last_ping_at_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn processed_total(&self) -> u64 {
        self.processed_total.load(Ordering::Relaxed)
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }

    pub fn parse_skipped(&self) -> u64 {
        self.parse_skipped.load(Ordering::Relaxed)
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read.load(Ordering::Relaxed)
    }

    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    pub fn queue_size(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }

    /// Assemble the full snapshot; endpoint states and breaker views are
    /// supplied by the supervisor, which owns them.
    pub fn snapshot(
        &self,
        upstream_state: SessionState,
        bus_state: BusState,
        circuit_states: CircuitStates,
    ) -> MetricsSnapshot {
        let processed_total = self.processed_total();
        let uptime_seconds = self.started_at.elapsed().as_secs_f64();
        let messages_per_second = if uptime_seconds > 0.0 {
            processed_total as f64 / uptime_seconds
        } else {
            0.0
        };

        MetricsSnapshot {
            processed_total,
            dropped_total: self.dropped_total(),
            parse_skipped: self.parse_skipped(),
            frames_read: self.frames_read(),
            publish_failures: PublishFailures {
                disconnected: self.publish_disconnected.load(Ordering::Relaxed),
                timeout: self.publish_timeout.load(Ordering::Relaxed),
                other: self.publish_other.load(Ordering::Relaxed),
                breaker_open: self.publish_breaker_open.load(Ordering::Relaxed),
            },
            queue_size: self.queue_size(),
            queue_capacity: self.queue_capacity,
            reconnect_attempts: self.reconnect_attempts(),
            last_message_at: epoch_ms(self.last_message_at_ms.load(Ordering::Relaxed)),
            last_ping_at: epoch_ms(self.last_ping_at_ms.load(Ordering::Relaxed)),
            uptime_seconds,
            messages_per_second,
            upstream_state,
            bus_state,
            circuit_states,
        }
    }
}

fn epoch_ms(ms: i64) -> Option<DateTime<Utc>> {
    if ms == 0 {
        return None;
    }
    Utc.timestamp_millis_opt(ms).single()
}

/// Read-only view over the core's counters and states.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub processed_total: u64,
    pub dropped_total: u64,
    pub parse_skipped: u64,
    pub frames_read: u64,
    pub publish_failures: PublishFailures,
    pub queue_size: usize,
    pub queue_capacity: usize,
    pub reconnect_attempts: u64,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_ping_at: Option<DateTime<Utc>>,
    pub uptime_seconds: f64,
    pub messages_per_second: f64,
    pub upstream_state: SessionState,
    pub bus_state: BusState,
    pub circuit_states: CircuitStates,
}

/// Publish failures by error class; each also counts toward `dropped_total`.
#[derive(Debug, Clone, Serialize)]
pub struct PublishFailures {
    pub disconnected: u64,
    pub timeout: u64,
    pub other: u64,
    pub breaker_open: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitStates {
    pub upstream: BreakerSnapshot,
    pub bus: BreakerSnapshot,
}
