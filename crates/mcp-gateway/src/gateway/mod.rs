//! Upstream connection management.
//!
//! - [`ConnectionSupervisor`] owns the single upstream connection and
//!   reconnects it with exponential backoff.
//! - [`RequestDispatcher`] forwards tool requests, waiting briefly for a
//!   connection when none is live.

mod backoff;
mod dispatcher;
mod events;
mod state;
mod supervisor;

pub use backoff::ReconnectConfig;
pub use dispatcher::{RequestDispatcher, DEFAULT_WAIT_TIMEOUT};
pub use events::{ConnectionObserver, ObservedEvent, UpstreamEvent};
pub use state::{AtomicConnectionState, ConnectionState};
pub use supervisor::ConnectionSupervisor;
