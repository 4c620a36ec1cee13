//! Engine connection state machine.
//!
//! ```text
//! Disconnected ──start──▶ Connecting ──Connected──▶ Connected
//!       ▲                                              │
//!       └──────Disconnected───── Reconnecting ◀────────┘
//! ```
//!
//! Transport status events drive every transition. Entering `Connected`
//! (for the first time or after a drop) is what triggers subscription and
//! session recovery in the engine.

use crate::transport::TransportStatus;
use std::fmt;
use tokio::sync::mpsc;

/// Stream of connectivity changes returned by `PollEngine::start`.
pub type StatusStream = mpsc::UnboundedReceiver<StatusUpdate>;

/// A connectivity change, with the transport's error when there was one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub connected: bool,
    pub error: Option<String>,
}

impl StatusUpdate {
    pub fn connected() -> Self {
        Self {
            connected: true,
            error: None,
        }
    }

    pub fn disconnected(error: Option<String>) -> Self {
        Self {
            connected: false,
            error,
        }
    }
}

/// Connection lifecycle of the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// State after the engine asks the transport to connect.
    pub fn on_start(self) -> Self {
        match self {
            Self::Connected => Self::Connected,
            _ => Self::Connecting,
        }
    }

    /// State after a transport status event.
    pub fn on_status(self, status: &TransportStatus) -> Self {
        match status {
            TransportStatus::Connected => Self::Connected,
            TransportStatus::Reconnecting => Self::Reconnecting,
            TransportStatus::Disconnected { .. } => Self::Disconnected,
        }
    }

    /// The update to report when moving from `self` to `next` because of
    /// `status`, if the change is worth reporting.
    pub fn update_for(self, next: Self, status: &TransportStatus) -> Option<StatusUpdate> {
        let error = match status {
            TransportStatus::Disconnected { error } => error.clone(),
            _ => None,
        };
        if self.is_connected() == next.is_connected() && error.is_none() {
            return None;
        }
        Some(StatusUpdate {
            connected: next.is_connected(),
            error,
        })
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}
