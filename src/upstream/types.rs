//! Upstream session errors and close reasons

/// Why the read loop ended. The supervisor decides whether to reconnect.
#[derive(Debug)]
pub enum CloseReason {
    /// The server sent a close frame.
    RemoteClosed,
    /// The shutdown signal was observed.
    Shutdown,
    /// A read or keepalive failure.
    Error(SessionError),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("websocket connect failed: {0}")]
    Connect(String),
    #[error("subscription not acknowledged: {0}")]
    Subscribe(String),
    #[error("websocket read failed: {0}")]
    Read(String),
    #[error("keepalive ping failed: {0}")]
    Ping(String),
}
