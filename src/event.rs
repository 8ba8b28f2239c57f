// MIT License - Copyright (c) 2026 Peter Wright
// Envisalink TPI client

use std::fmt;

/// Lifecycle of a TPI session.
///
/// ```text
/// Disconnected -> Connecting -> Authenticating -> Ready
///                     |               |             |
///                     +---------------+-------------+--> Closed | Faulted
/// ```
///
/// `Closed` and `Faulted` are terminal for a session. A reconnect starts a
/// fresh session from `Disconnected`. Users observe transitions via
/// `client.subscribe_state()`, a `tokio::sync::watch::Receiver<ConnectionState>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket
    Disconnected,
    /// TCP connect in progress
    Connecting,
    /// Socket open, login handshake in progress
    Authenticating,
    /// Logged in; commands may be sent
    Ready,
    /// Closed by the owner
    Closed,
    /// Closed because of an unrecoverable error
    Faulted(String),
}

impl ConnectionState {
    /// Whether this state ends the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Faulted(_))
    }

    /// Whether the socket may carry commands in this state.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Authenticating | Self::Ready)
    }

    /// Whether moving from `self` to `next` is a legal transition within a session.
    pub fn can_transition_to(&self, next: &ConnectionState) -> bool {
        use ConnectionState::*;
        match (self, next) {
            (Disconnected, Connecting) => true,
            (Connecting, Authenticating) => true,
            (Authenticating, Ready) => true,
            (from, Closed | Faulted(_)) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Authenticating => f.write_str("authenticating"),
            Self::Ready => f.write_str("ready"),
            Self::Closed => f.write_str("closed"),
            Self::Faulted(reason) => write!(f, "faulted ({reason})"),
        }
    }
}

/// Type alias for the state sender shared across sessions.
pub type StateSender = tokio::sync::watch::Sender<ConnectionState>;

/// Type alias for the state receiver handed to users.
pub type StateReceiver = tokio::sync::watch::Receiver<ConnectionState>;

/// Create a state channel starting in `Disconnected`.
pub fn state_channel() -> (StateSender, StateReceiver) {
    tokio::sync::watch::channel(ConnectionState::Disconnected)
}
