//! Client connection lifecycle.

use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of a [`Client`](crate::Client).
///
/// Transitions only move forward:
/// `Disconnected → Connecting → HandshakePending → Open → Closed`.
/// A failed `connect` falls back from `Connecting` to `Disconnected`; every
/// other state can jump straight to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum ConnectionState {
    /// No transport yet.
    #[default]
    Disconnected,
    /// Transport (and TLS) being established.
    Connecting,
    /// Upgrade request sent, waiting for the server response.
    HandshakePending,
    /// Handshake finished; messages may be sent and received.
    Open,
    /// Terminal.
    Closed,
}

impl ConnectionState {
    /// Check if sending data is allowed in this state.
    #[must_use]
    #[inline]
    pub const fn can_send(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// Returns `true` once the connection can no longer be used.
    #[must_use]
    #[inline]
    pub const fn is_closed(&self) -> bool {
        matches!(self, ConnectionState::Closed)
    }

    const fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::HandshakePending => 2,
            ConnectionState::Open => 3,
            ConnectionState::Closed => 4,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Disconnected,
            1 => ConnectionState::Connecting,
            2 => ConnectionState::HandshakePending,
            3 => ConnectionState::Open,
            _ => ConnectionState::Closed,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::HandshakePending => write!(f, "HandshakePending"),
            ConnectionState::Open => write!(f, "Open"),
            ConnectionState::Closed => write!(f, "Closed"),
        }
    }
}

/// [`ConnectionState`] shared between the caller and the receiver task.
#[derive(Debug, Default)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move from `from` to `to`. Fails if another actor changed the state
    /// first.
    pub(crate) fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.0
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Enter `Closed` unconditionally, returning the previous state.
    pub(crate) fn close(&self) -> ConnectionState {
        ConnectionState::from_u8(
            self.0
                .swap(ConnectionState::Closed.as_u8(), Ordering::AcqRel),
        )
    }
}
