//! Upstream connection event types.

use tokio::sync::mpsc;

/// Notifications emitted by an upstream connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamEvent {
    /// The connection was closed by the peer or the network.
    Closed {
        /// Reason for the close.
        reason: String,
    },
    /// The connection hit a socket-level error.
    Error {
        /// Error description.
        message: String,
    },
}

/// An [`UpstreamEvent`] tagged with the connection generation that raised it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedEvent {
    /// Generation of the connection that emitted the event.
    pub generation: u64,
    /// The event.
    pub event: UpstreamEvent,
}

/// Close/error observer handed to a transport when a connection is opened.
///
/// Sending never blocks; if the supervisor is gone the event is dropped.
#[derive(Debug, Clone)]
pub struct ConnectionObserver {
    generation: u64,
    tx: mpsc::UnboundedSender<ObservedEvent>,
}

impl ConnectionObserver {
    /// Create an observer for the given connection generation.
    #[must_use]
    pub const fn new(generation: u64, tx: mpsc::UnboundedSender<ObservedEvent>) -> Self {
        Self { generation, tx }
    }

    /// Generation of the observed connection.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Report that the connection closed.
    pub fn closed(&self, reason: impl Into<String>) {
        self.emit(UpstreamEvent::Closed {
            reason: reason.into(),
        });
    }

    /// Report a socket-level error.
    pub fn error(&self, message: impl Into<String>) {
        self.emit(UpstreamEvent::Error {
            message: message.into(),
        });
    }

    fn emit(&self, event: UpstreamEvent) {
        let _ = self.tx.send(ObservedEvent {
            generation: self.generation,
            event,
        });
    }
}
