//! Session lifecycle state

use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};

/// Upstream session state, owned by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Draining,
    Stopped,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Connected => write!(f, "connected"),
            SessionState::Draining => write!(f, "draining"),
            SessionState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Lock-free cell so the health surface can read the state without
/// touching the supervisor.
pub(crate) struct SessionStateCell(AtomicU8);

impl SessionStateCell {
    pub(crate) fn new(state: SessionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn get(&self) -> SessionState {
        match self.0.load(Ordering::Relaxed) {
            0 => SessionState::Disconnected,
            1 => SessionState::Connecting,
            2 => SessionState::Connected,
            3 => SessionState::Draining,
            _ => SessionState::Stopped,
        }
    }

    pub(crate) fn set(&self, state: SessionState) {
        self.0.store(state as u8, Ordering::Relaxed);
        tracing::debug!(state = %state, "Session state changed");
    }
}
