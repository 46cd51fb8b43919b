//! Upstream WebSocket session
//!
//! Owns the single connection to the Binance combined-stream endpoint:
//! dial, subscribe, read frames into the bounded queue, keepalive pings,
//! graceful close.

mod session;
mod types;

pub use session::UpstreamSession;
pub use types::{CloseReason, SessionError};
