//! Bounded frame queue between the upstream reader and the worker pool
//!
//! Single producer (the upstream reader), multiple consumers (the workers).
//! The producer never blocks: when the queue is full the incoming frame is
//! dropped so the upstream TCP receive window never backs up.

use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};

/// One parsed upstream frame awaiting publication.
#[derive(Debug, Clone)]
pub struct Frame {
    pub stream: String,
    pub payload: Value,
}

/// Create a bounded queue with the given capacity.
pub fn bounded(capacity: usize, warn_window: Duration) -> (Producer, Consumer) {
    let (tx, rx) = mpsc::channel(capacity);
    let depth = Arc::new(AtomicUsize::new(0));

    let producer = Producer {
        tx,
        depth: Arc::clone(&depth),
        capacity,
        warn_window,
        last_warn: None,
    };
    let consumer = Consumer {
        rx: Arc::new(Mutex::new(rx)),
        depth,
    };
    (producer, consumer)
}

/// Producer half, owned by the upstream reader. Dropping it closes the
/// queue; consumers drain what remains and then observe end-of-queue.
pub struct Producer {
    tx: mpsc::Sender<Frame>,
    depth: Arc<AtomicUsize>,
    capacity: usize,
    warn_window: Duration,
    last_warn: Option<Instant>,
}

impl Producer {
    /// Enqueue without blocking. Returns `false` when the frame was dropped
    /// because the queue is full (or closed); the caller accounts the drop.
    pub fn enqueue(&mut self, frame: Frame) -> bool {
        // Count before sending so a consumer can never decrement a frame
        // that was not yet added to the gauge.
        self.depth.fetch_add(1, Ordering::Relaxed);
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(frame)) => {
                self.depth.fetch_sub(1, Ordering::Relaxed);
                self.warn_throttled(&frame.stream);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.depth.fetch_sub(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn depth_handle(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.depth)
    }

    fn warn_throttled(&mut self, stream: &str) {
        let due = self
            .last_warn
            .map_or(true, |at| at.elapsed() >= self.warn_window);
        if due {
            tracing::warn!(
                stream = stream,
                capacity = self.capacity,
                "Frame queue full, dropping incoming frames"
            );
            self.last_warn = Some(Instant::now());
        }
    }
}

/// Consumer half, cloned across workers. Dequeue order is FIFO.
#[derive(Clone)]
pub struct Consumer {
    rx: Arc<Mutex<mpsc::Receiver<Frame>>>,
    depth: Arc<AtomicUsize>,
}

impl Consumer {
    /// Wait for the next frame. Returns `None` once the queue is closed and
    /// fully drained.
    pub async fn recv(&self) -> Option<Frame> {
        let mut rx = self.rx.lock().await;
        let frame = rx.recv().await;
        if frame.is_some() {
            self.depth.fetch_sub(1, Ordering::Relaxed);
        }
        frame
    }

    pub fn len(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
