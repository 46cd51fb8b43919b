//! Worker pool draining the frame queue into the bus
//!
//! Each worker dequeues, wraps the frame in an envelope and publishes it
//! under the bus circuit breaker. Delivery is at-most-once: a failed publish
//! drops the frame after the single attempt.

use crate::breaker::{BreakerError, CircuitBreaker};
use crate::bus::Publisher;
use crate::envelope::{Envelope, MonotonicClock, TraceInjector};
use crate::metrics::Metrics;
use crate::queue::{Consumer, Frame};
use std::sync::Arc;
use tokio::task::JoinHandle;

pub struct WorkerPool;

impl WorkerPool {
    /// Spawn `count` identical workers. They exit cooperatively once the
    /// queue is closed and drained.
    pub fn spawn(
        count: usize,
        consumer: Consumer,
        publisher: Arc<dyn Publisher>,
        breaker: Arc<CircuitBreaker>,
        metrics: Arc<Metrics>,
        subject: String,
        tracer: Option<Arc<dyn TraceInjector>>,
    ) -> Vec<JoinHandle<()>> {
        (0..count)
            .map(|id| {
                let consumer = consumer.clone();
                let publisher = Arc::clone(&publisher);
                let breaker = Arc::clone(&breaker);
                let metrics = Arc::clone(&metrics);
                let subject = subject.clone();
                let tracer = tracer.clone();
                tokio::spawn(worker_loop(
                    id, consumer, publisher, breaker, metrics, subject, tracer,
                ))
            })
            .collect()
    }
}

async fn worker_loop(
    id: usize,
    consumer: Consumer,
    publisher: Arc<dyn Publisher>,
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<Metrics>,
    subject: String,
    tracer: Option<Arc<dyn TraceInjector>>,
) {
    tracing::debug!(worker = id, "Worker started");
    let mut clock = MonotonicClock::new();

    while let Some(frame) = consumer.recv().await {
        // The in-flight gauge covers the window between dequeue and
        // accounting, so a drain deadline can still count every frame.
        metrics.inc_in_flight();
        process_frame(
            id,
            frame,
            &mut clock,
            publisher.as_ref(),
            &breaker,
            &metrics,
            &subject,
            tracer.as_deref(),
        )
        .await;
        metrics.dec_in_flight();
    }

    tracing::debug!(worker = id, "Worker stopped, queue drained");
}

#[allow(clippy::too_many_arguments)]
async fn process_frame(
    id: usize,
    frame: Frame,
    clock: &mut MonotonicClock,
    publisher: &dyn Publisher,
    breaker: &CircuitBreaker,
    metrics: &Metrics,
    subject: &str,
    tracer: Option<&dyn TraceInjector>,
) {
    let trace_context = tracer.and_then(|t| t.inject());
    let envelope = match Envelope::new(frame.stream, frame.payload, clock.now(), trace_context) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(worker = id, error = %e, "Discarding invalid frame");
            metrics.inc_parse_skipped();
            return;
        }
    };

    let payload = match envelope.to_bytes() {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(worker = id, error = %e, "Failed to serialize envelope");
            metrics.inc_dropped();
            return;
        }
    };

    match breaker.call(|| publisher.publish(subject, payload)).await {
        Ok(()) => metrics.inc_processed(),
        Err(BreakerError::Open) => {
            tracing::debug!(worker = id, "Bus breaker open, dropping frame");
            metrics.inc_publish_breaker_open();
            metrics.inc_dropped();
        }
        Err(BreakerError::Inner(e)) => {
            tracing::warn!(worker = id, error = %e, "Publish failed, dropping frame");
            metrics.record_publish_error(&e);
            metrics.inc_dropped();
        }
    }
}
