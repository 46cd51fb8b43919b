//! Lifecycle controller
//!
//! Owns the upstream session, bounded queue, worker pool and bus publisher.
//! Starts them in dependency order, drives reconnection with exponential
//! backoff, runs the heartbeat, and performs orderly shutdown.

mod backoff;
mod state;

pub use state::SessionState;
use state::SessionStateCell;

use crate::breaker::{BreakerError, CircuitBreaker};
use crate::bus::{BusState, NatsPublisher, Publisher};
use crate::config::{Config, UpstreamConfig};
use crate::envelope::TraceInjector;
use crate::metrics::{CircuitStates, Metrics, MetricsSnapshot};
use crate::queue::{self, Consumer, Producer};
use crate::upstream::{CloseReason, UpstreamSession};
use crate::worker::WorkerPool;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Conditions the supervisor does not recover from.
#[derive(Debug, thiserror::Error)]
pub enum FatalError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("upstream reconnection budget exhausted after {0} attempts")]
    ReconnectBudgetExhausted(u32),
    #[error("shutdown requested during startup")]
    ShutdownDuringStart,
    #[error("bridge already started")]
    AlreadyStarted,
}

/// State shared between the supervisor's tasks and the read-only view.
struct Shared {
    metrics: Arc<Metrics>,
    upstream_breaker: Arc<CircuitBreaker>,
    bus_breaker: Arc<CircuitBreaker>,
    session_state: SessionStateCell,
    budget_exhausted: AtomicBool,
    bus: RwLock<Option<Arc<dyn Publisher>>>,
}

impl Shared {
    fn bus_state(&self) -> BusState {
        self.bus
            .read()
            .as_ref()
            .map(|publisher| publisher.state())
            .unwrap_or(BusState::Disconnected)
    }

    fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot(
            self.session_state.get(),
            self.bus_state(),
            CircuitStates {
                upstream: self.upstream_breaker.snapshot(),
                bus: self.bus_breaker.snapshot(),
            },
        )
    }
}

/// Read-only view handed to collaborators (health surface, CLI). Snapshots
/// only; nothing here can mutate core state.
#[derive(Clone)]
pub struct BridgeView {
    shared: Arc<Shared>,
}

impl BridgeView {
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.shared.snapshot()
    }

    /// True iff both endpoints are connected.
    pub fn is_ready(&self) -> bool {
        self.shared.session_state.get() == SessionState::Connected
            && self.shared.bus_state() == BusState::Connected
    }

    /// True while the reconnection budget has not been exhausted.
    pub fn is_healthy(&self) -> bool {
        !self.shared.budget_exhausted.load(Ordering::Relaxed)
    }
}

pub struct Supervisor {
    config: Config,
    shared: Arc<Shared>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    producer: Option<Producer>,
    consumer: Consumer,
    tracer: Option<Arc<dyn TraceInjector>>,
    session: Option<JoinHandle<Result<(), FatalError>>>,
    workers: Vec<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
}

impl Supervisor {
    pub fn new(mut config: Config) -> Self {
        config.normalize();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (producer, consumer) = queue::bounded(
            config.bridge.queue_capacity,
            config.bridge.drop_warn_window(),
        );
        let metrics = Arc::new(Metrics::new(
            producer.depth_handle(),
            config.bridge.queue_capacity,
        ));
        let shared = Arc::new(Shared {
            metrics,
            upstream_breaker: Arc::new(CircuitBreaker::from_config("upstream", &config.breaker)),
            bus_breaker: Arc::new(CircuitBreaker::from_config("bus", &config.breaker)),
            session_state: SessionStateCell::new(SessionState::Disconnected),
            budget_exhausted: AtomicBool::new(false),
            bus: RwLock::new(None),
        });

        Self {
            config,
            shared,
            shutdown_tx,
            shutdown_rx,
            producer: Some(producer),
            consumer,
            tracer: None,
            session: None,
            workers: Vec::new(),
            heartbeat: None,
        }
    }

    /// Construct with a pre-connected publisher; `start` skips the bus dial.
    pub fn with_publisher(config: Config, publisher: Arc<dyn Publisher>) -> Self {
        let supervisor = Self::new(config);
        *supervisor.shared.bus.write() = Some(publisher);
        supervisor
    }

    /// Attach a trace-context injector invoked once per envelope.
    pub fn with_tracer(mut self, tracer: Arc<dyn TraceInjector>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    pub fn view(&self) -> BridgeView {
        BridgeView {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Shutdown signal observed by every task at its next suspension point.
    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Bring the bridge up: bus publisher, worker pool, upstream session,
    /// heartbeat. Fails only on invalid configuration or shutdown mid-start.
    pub async fn start(&mut self) -> Result<(), FatalError> {
        self.config
            .validate()
            .map_err(|e| FatalError::InvalidConfig(e.to_string()))?;
        let producer = self.producer.take().ok_or(FatalError::AlreadyStarted)?;

        tracing::info!(
            upstream = %self.config.upstream.url,
            streams = ?self.config.upstream.streams,
            bus = %self.config.bus.url,
            subject = %self.config.bus.subject,
            workers = self.config.bridge.worker_count,
            queue_capacity = self.config.bridge.queue_capacity,
            "Starting bridge"
        );

        let publisher = match self.shared.bus.read().clone() {
            Some(publisher) => publisher,
            None => {
                let publisher = self.acquire_publisher().await?;
                *self.shared.bus.write() = Some(Arc::clone(&publisher));
                publisher
            }
        };

        self.workers = WorkerPool::spawn(
            self.config.bridge.worker_count,
            self.consumer.clone(),
            publisher,
            Arc::clone(&self.shared.bus_breaker),
            Arc::clone(&self.shared.metrics),
            self.config.bus.subject.clone(),
            self.tracer.clone(),
        );

        self.session = Some(tokio::spawn(session_loop(
            self.config.upstream.clone(),
            Arc::clone(&self.shared),
            producer,
            self.shutdown_rx.clone(),
        )));

        self.heartbeat = Some(tokio::spawn(heartbeat_loop(
            Arc::clone(&self.shared),
            self.config.bridge.heartbeat_interval(),
            self.shutdown_rx.clone(),
        )));

        tracing::info!("Bridge started");
        Ok(())
    }

    /// Block until the session loop ends fatally (or forever while healthy).
    pub async fn wait(&mut self) -> Result<(), FatalError> {
        match self.session.as_mut() {
            Some(handle) => {
                let result = match handle.await {
                    Ok(result) => result,
                    Err(_) => Ok(()),
                };
                self.session = None;
                result
            }
            None => std::future::pending().await,
        }
    }

    /// Drain and tear down: stop accepting upstream frames, let workers
    /// empty the queue until the deadline, then flush and close the bus.
    pub async fn stop(&mut self, deadline: Duration) {
        tracing::info!("Stopping bridge");
        self.shared.session_state.set(SessionState::Draining);
        let _ = self.shutdown_tx.send(true);

        if let Some(session) = self.session.take() {
            let _ = session.await;
        }

        let drain_deadline = tokio::time::Instant::now() + deadline;
        let mut aborted = false;
        for mut worker in std::mem::take(&mut self.workers) {
            if tokio::time::timeout_at(drain_deadline, &mut worker)
                .await
                .is_err()
            {
                worker.abort();
                let _ = worker.await;
                aborted = true;
            }
        }
        if aborted {
            // Frames still queued or held by an aborted worker were neither
            // published nor previously counted.
            let remaining =
                self.shared.metrics.queue_size() as u64 + self.shared.metrics.in_flight();
            if remaining > 0 {
                self.shared.metrics.add_dropped(remaining);
                tracing::warn!(remaining, "Drain deadline elapsed, dropping queued frames");
            }
        }

        let publisher = self.shared.bus.write().take();
        if let Some(publisher) = publisher {
            if let Err(e) = publisher.close(self.config.bus.flush_timeout()).await {
                tracing::warn!(error = %e, "Bus close failed");
            }
        }

        if let Some(heartbeat) = self.heartbeat.take() {
            let _ = heartbeat.await;
        }

        self.shared.session_state.set(SessionState::Stopped);
        tracing::info!("Bridge stopped");
    }

    /// Connect to the bus, retrying under the bus breaker until success or
    /// shutdown.
    async fn acquire_publisher(&self) -> Result<Arc<dyn Publisher>, FatalError> {
        let mut shutdown = self.shutdown_rx.clone();
        let mut failures: u32 = 0;
        loop {
            if *shutdown.borrow() {
                return Err(FatalError::ShutdownDuringStart);
            }

            match self
                .shared
                .bus_breaker
                .call(|| NatsPublisher::connect(&self.config.bus))
                .await
            {
                Ok(publisher) => return Ok(Arc::new(publisher)),
                Err(BreakerError::Open) => {
                    tracing::warn!("Bus breaker open, delaying connect");
                }
                Err(BreakerError::Inner(e)) => {
                    tracing::warn!(error = %e, "Failed to connect to bus, retrying");
                }
            }

            let delay = backoff::delay(
                self.config.upstream.reconnect_base_delay(),
                self.config.upstream.reconnect_max_delay(),
                failures,
            );
            failures = failures.saturating_add(1);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => return Err(FatalError::ShutdownDuringStart),
            }
        }
    }
}

/// Connect-read-reconnect state machine. Returns `Err` only when the
/// reconnection budget is exhausted; `Ok` on shutdown. Dropping the producer
/// on exit closes the queue so workers drain and stop.
async fn session_loop(
    config: UpstreamConfig,
    shared: Arc<Shared>,
    mut producer: Producer,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), FatalError> {
    let mut failures: u32 = 0;
    loop {
        if *shutdown.borrow() {
            break;
        }

        shared.session_state.set(SessionState::Connecting);
        match UpstreamSession::connect(&config, &shared.upstream_breaker).await {
            Ok(session) => {
                failures = 0;
                shared.session_state.set(SessionState::Connected);
                tracing::info!("Upstream session established");

                let reason = session
                    .run(
                        &mut producer,
                        &config,
                        Arc::clone(&shared.metrics),
                        shutdown.clone(),
                    )
                    .await;
                shared.session_state.set(SessionState::Disconnected);
                match reason {
                    CloseReason::Shutdown => break,
                    CloseReason::RemoteClosed => {
                        tracing::warn!("Upstream connection closed");
                    }
                    CloseReason::Error(e) => {
                        tracing::warn!(error = %e, "Upstream session failed");
                    }
                }
            }
            Err(BreakerError::Open) => {
                failures += 1;
                tracing::warn!(failures, "Upstream breaker open, connect rejected");
            }
            Err(BreakerError::Inner(e)) => {
                failures += 1;
                tracing::warn!(error = %e, failures, "Upstream connect failed");
            }
        }

        if failures >= config.max_reconnect_attempts {
            shared.budget_exhausted.store(true, Ordering::Relaxed);
            shared.session_state.set(SessionState::Disconnected);
            tracing::error!(
                attempts = failures,
                "Upstream reconnection budget exhausted"
            );
            return Err(FatalError::ReconnectBudgetExhausted(failures));
        }

        let delay = backoff::delay(
            config.reconnect_base_delay(),
            config.reconnect_max_delay(),
            failures,
        );
        tracing::info!(
            delay_ms = delay.as_millis() as u64,
            "Scheduling upstream reconnect"
        );
        shared.metrics.inc_reconnect_attempts();
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
    }
    Ok(())
}

/// Emit one structured record per interval with the metrics snapshot and the
/// per-interval throughput.
async fn heartbeat_loop(
    shared: Arc<Shared>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick completes immediately; skip it so intervals are full.
    ticker.tick().await;

    let mut last_processed: u64 = 0;
    let mut last_dropped: u64 = 0;
    let mut last_at = Instant::now();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snap = shared.snapshot();
                let elapsed = last_at.elapsed().as_secs_f64();
                let processed_delta = snap.processed_total.saturating_sub(last_processed);
                let dropped_delta = snap.dropped_total.saturating_sub(last_dropped);
                let rate = if elapsed > 0.0 {
                    processed_delta as f64 / elapsed
                } else {
                    0.0
                };

                tracing::info!(
                    processed_total = snap.processed_total,
                    dropped_total = snap.dropped_total,
                    parse_skipped = snap.parse_skipped,
                    processed_since_last = processed_delta,
                    dropped_since_last = dropped_delta,
                    messages_per_second = (rate * 100.0).round() / 100.0,
                    queue_size = snap.queue_size,
                    queue_capacity = snap.queue_capacity,
                    reconnect_attempts = snap.reconnect_attempts,
                    upstream_state = %snap.upstream_state,
                    bus_state = %snap.bus_state,
                    uptime_seconds = snap.uptime_seconds as u64,
                    "Heartbeat"
                );

                last_processed = snap.processed_total;
                last_dropped = snap.dropped_total;
                last_at = Instant::now();
            }
            _ = shutdown.changed() => break,
        }
    }
}
