//! binance-bridge: one-way bridge from Binance WebSocket streams to NATS
//!
//! This library provides the core components for:
//! - A single upstream WebSocket session with subscription management
//! - A bounded lossy queue decoupling the reader from publication
//! - A worker pool wrapping frames into canonical envelopes
//! - A NATS publisher with classified errors
//! - Circuit breakers on both endpoints
//! - A supervisor driving reconnection, heartbeat and orderly shutdown
//! - Live operational metrics and an HTTP health surface

pub mod breaker;
pub mod bus;
pub mod cli;
pub mod config;
pub mod envelope;
pub mod health;
pub mod metrics;
pub mod queue;
pub mod supervisor;
pub mod telemetry;
pub mod upstream;
pub mod worker;
