//! Connection state types.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::watch;

/// State of the upstream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Not connected, and no retry pending.
    Disconnected = 0,
    /// A connect attempt is in flight.
    Connecting = 1,
    /// Connected and initialized.
    Connected = 2,
    /// A reconnection timer is pending.
    ReconnectScheduled = 3,
    /// Permanently disconnected (retries exhausted).
    Failed = 4,
}

impl ConnectionState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Disconnected,
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::ReconnectScheduled,
            _ => Self::Failed,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::ReconnectScheduled => "reconnect_scheduled",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Atomic wrapper for connection state.
///
/// Transitions are compare-and-swap so that two tasks can never both move the
/// state out of the same source state. Every successful transition is published
/// on a watch channel for tasks waiting on the connection.
#[derive(Debug)]
pub struct AtomicConnectionState {
    raw: AtomicU8,
    notify: watch::Sender<ConnectionState>,
}

impl AtomicConnectionState {
    /// Create a new atomic state.
    #[must_use]
    pub fn new(state: ConnectionState) -> Self {
        let (notify, _) = watch::channel(state);
        Self {
            raw: AtomicU8::new(state as u8),
            notify,
        }
    }

    /// Load the current state.
    #[must_use]
    pub fn load(&self) -> ConnectionState {
        ConnectionState::from_u8(self.raw.load(Ordering::SeqCst))
    }

    /// Store a new state unconditionally.
    pub fn store(&self, state: ConnectionState) {
        self.raw.store(state as u8, Ordering::SeqCst);
        self.notify.send_replace(state);
    }

    /// Move from any of `from` to `to`.
    ///
    /// Returns the previous state on success, or the observed state when it was
    /// not one of `from`.
    pub fn transition(
        &self,
        from: &[ConnectionState],
        to: ConnectionState,
    ) -> Result<ConnectionState, ConnectionState> {
        let mut current = self.raw.load(Ordering::SeqCst);
        loop {
            let observed = ConnectionState::from_u8(current);
            if !from.contains(&observed) {
                return Err(observed);
            }
            match self
                .raw
                .compare_exchange(current, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => {
                    self.notify.send_replace(to);
                    return Ok(observed);
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Subscribe to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.notify.subscribe()
    }
}
