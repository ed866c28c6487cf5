//! Connection supervisor: owns the upstream connection and its reconnection.
//!
//! State machine:
//!
//! ```text
//! Disconnected ──connect──► Connecting ──ok──► Connected
//!                               │                  │ closed / error / transport failure
//!                               │ failed           ▼
//!                               └──────────► ReconnectScheduled ──timer──► Connecting
//!                                                  │
//!                                     retries exhausted
//!                                                  ▼
//!                                               Failed
//! ```
//!
//! `shutdown()` moves any state to `Disconnected` and disables reconnection.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::backoff::ReconnectConfig;
use super::events::{ConnectionObserver, ObservedEvent, UpstreamEvent};
use super::state::{AtomicConnectionState, ConnectionState};
use crate::transport::{Connector, UpstreamConnection};

/// A connection tagged with the generation it was opened under.
struct Installed<T> {
    generation: u64,
    connection: Arc<T>,
}

struct Inner<C: Connector> {
    connector: C,
    config: ReconnectConfig,
    state: AtomicConnectionState,
    should_reconnect: AtomicBool,
    retry_count: AtomicU32,
    next_generation: AtomicU64,
    /// Highest generation reported closed or failed.
    lost_generation: AtomicU64,
    current: RwLock<Option<Installed<C::Connection>>>,
    /// Connections taken out of service but not yet closed.
    retired: Mutex<Vec<Arc<C::Connection>>>,
    reconnect_timer: Mutex<Option<JoinHandle<()>>>,
    events_tx: mpsc::UnboundedSender<ObservedEvent>,
}

/// Supervises the single upstream connection.
///
/// Cheap to clone; all clones share the same state. Must be created inside a
/// Tokio runtime.
pub struct ConnectionSupervisor<C: Connector> {
    inner: Arc<Inner<C>>,
}

impl<C: Connector> Clone for ConnectionSupervisor<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector> ConnectionSupervisor<C> {
    /// Create a supervisor. No connection is attempted until [`connect`](Self::connect).
    #[must_use]
    pub fn new(connector: C, config: ReconnectConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            connector,
            config,
            state: AtomicConnectionState::new(ConnectionState::Disconnected),
            should_reconnect: AtomicBool::new(true),
            retry_count: AtomicU32::new(0),
            next_generation: AtomicU64::new(0),
            lost_generation: AtomicU64::new(0),
            current: RwLock::new(None),
            retired: Mutex::new(Vec::new()),
            reconnect_timer: Mutex::new(None),
            events_tx,
        });

        tokio::spawn(event_loop(Arc::downgrade(&inner), events_rx));

        Self { inner }
    }

    /// Open a fresh upstream connection.
    ///
    /// Returns immediately with `None` if a connect attempt is already in
    /// flight, or the supervisor has shut down or given up. A failed attempt
    /// schedules a reconnection and returns `None`.
    pub async fn connect(&self) -> Option<Arc<C::Connection>> {
        self.inner.connect().await
    }

    /// Schedule a reconnection with backoff.
    ///
    /// No-op while a connect is in flight, a timer is already pending, or
    /// reconnection is disabled. Takes the current connection out of service.
    pub fn schedule_reconnect(&self) {
        self.inner
            .schedule_from(&[ConnectionState::Connected, ConnectionState::Disconnected]);
    }

    /// Report that a request on `connection` failed at the transport level.
    ///
    /// Failures from a connection that has already been replaced are ignored.
    pub fn report_connection_failure(&self, connection: &Arc<C::Connection>) {
        let stale = self
            .inner
            .current
            .read()
            .as_ref()
            .is_some_and(|installed| !Arc::ptr_eq(&installed.connection, connection));
        if stale {
            debug!("ignoring failure from replaced upstream connection");
            return;
        }
        self.schedule_reconnect();
    }

    /// Handle a close notification from the connection of `generation`.
    pub fn on_upstream_closed(&self, generation: u64, reason: &str) {
        self.inner.handle_event(ObservedEvent {
            generation,
            event: UpstreamEvent::Closed {
                reason: reason.to_string(),
            },
        });
    }

    /// Handle an error notification from the connection of `generation`.
    pub fn on_upstream_error(&self, generation: u64, message: &str) {
        self.inner.handle_event(ObservedEvent {
            generation,
            event: UpstreamEvent::Error {
                message: message.to_string(),
            },
        });
    }

    /// Stop reconnecting, cancel any pending timer and close connections.
    ///
    /// Idempotent.
    pub async fn shutdown(&self) {
        let was_running = self.inner.should_reconnect.swap(false, Ordering::SeqCst);

        if let Some(timer) = self.inner.reconnect_timer.lock().take() {
            timer.abort();
        }

        self.inner.retire_current();
        self.inner.close_retired().await;
        self.inner.state.store(ConnectionState::Disconnected);

        if was_running {
            info!("upstream supervisor shut down");
        }
    }

    /// The current connection, if connected.
    #[must_use]
    pub fn current(&self) -> Option<Arc<C::Connection>> {
        if self.inner.state.load() != ConnectionState::Connected {
            return None;
        }
        self.inner
            .current
            .read()
            .as_ref()
            .map(|installed| Arc::clone(&installed.connection))
    }

    /// Generation of the current connection, if connected.
    #[must_use]
    pub fn current_generation(&self) -> Option<u64> {
        self.inner
            .current
            .read()
            .as_ref()
            .map(|installed| installed.generation)
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.state.load()
    }

    /// Reconnections scheduled since the last successful connect.
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.inner.retry_count.load(Ordering::SeqCst)
    }

    /// Whether reconnection is still enabled (false after shutdown).
    #[must_use]
    pub fn is_reconnect_enabled(&self) -> bool {
        self.inner.should_reconnect.load(Ordering::SeqCst)
    }

    /// Whether a reconnection timer is pending.
    #[must_use]
    pub fn has_pending_reconnect(&self) -> bool {
        self.inner.state.load() == ConnectionState::ReconnectScheduled
    }

    /// Subscribe to state transitions.
    ///
    /// The channel is a wake-up signal; re-read [`state`](Self::state) or
    /// [`current`](Self::current) after each change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Reconnection configuration.
    #[must_use]
    pub fn config(&self) -> &ReconnectConfig {
        &self.inner.config
    }
}

impl<C: Connector> Inner<C> {
    async fn connect(self: &Arc<Self>) -> Option<Arc<C::Connection>> {
        if !self.should_reconnect.load(Ordering::SeqCst) {
            debug!("connect skipped: supervisor is shut down");
            return None;
        }

        if let Err(observed) = self.state.transition(
            &[
                ConnectionState::Disconnected,
                ConnectionState::ReconnectScheduled,
                ConnectionState::Connected,
            ],
            ConnectionState::Connecting,
        ) {
            debug!(state = %observed, "connect skipped");
            return None;
        }

        // A manual connect supersedes any pending timer.
        if let Some(timer) = self.reconnect_timer.lock().take() {
            timer.abort();
        }

        self.retire_current();
        self.close_retired().await;

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let observer = ConnectionObserver::new(generation, self.events_tx.clone());
        debug!(generation, "opening upstream connection");

        let connection = match self.connector.connect(observer).await {
            Ok(connection) => Arc::new(connection),
            Err(e) => {
                warn!(
                    error = %e,
                    generation,
                    retries = self.retry_count.load(Ordering::SeqCst),
                    "upstream connect failed"
                );
                if self.should_reconnect.load(Ordering::SeqCst) {
                    self.schedule_from(&[ConnectionState::Connecting]);
                } else {
                    let _ = self
                        .state
                        .transition(&[ConnectionState::Connecting], ConnectionState::Disconnected);
                }
                return None;
            }
        };

        *self.current.write() = Some(Installed {
            generation,
            connection: Arc::clone(&connection),
        });

        if self
            .state
            .transition(&[ConnectionState::Connecting], ConnectionState::Connected)
            .is_err()
            || !self.should_reconnect.load(Ordering::SeqCst)
        {
            // Shut down while the handshake was in flight.
            self.retire_current();
            self.close_retired().await;
            return None;
        }

        self.retry_count.store(0, Ordering::SeqCst);
        info!(generation, "upstream connected");

        if self.lost_generation.load(Ordering::SeqCst) >= generation {
            warn!(generation, "upstream connection lost during handshake");
            self.schedule_from(&[ConnectionState::Connected]);
            return None;
        }

        Some(connection)
    }

    fn schedule_from(self: &Arc<Self>, from: &[ConnectionState]) {
        if !self.should_reconnect.load(Ordering::SeqCst) {
            debug!("reconnect not scheduled: reconnection disabled");
            return;
        }

        let retries = self.retry_count.load(Ordering::SeqCst);
        let exhausted = !self.config.allows_retry(retries);
        let target = if exhausted {
            ConnectionState::Failed
        } else {
            ConnectionState::ReconnectScheduled
        };

        let previous = match self.state.transition(from, target) {
            Ok(previous) => previous,
            Err(observed) => {
                debug!(state = %observed, "reconnect not scheduled");
                return;
            }
        };

        if previous == ConnectionState::Connected {
            self.retire_current();
        }

        if exhausted {
            error!(retries, "giving up on upstream connection: retries exhausted");
            return;
        }

        let delay = self.config.delay(retries);
        let attempt = self.retry_count.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "reconnect scheduled"
        );

        let inner = Arc::clone(self);
        let mut timer = self.reconnect_timer.lock();
        *timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.reconnect_timer.lock().take();
            inner.connect().await;
        }));
    }

    fn handle_event(self: &Arc<Self>, observed: ObservedEvent) {
        let ObservedEvent { generation, event } = observed;
        self.lost_generation.fetch_max(generation, Ordering::SeqCst);

        let is_current = self
            .current
            .read()
            .as_ref()
            .is_some_and(|installed| installed.generation == generation);
        if !is_current {
            debug!(generation, ?event, "ignoring event from inactive connection");
            return;
        }

        match &event {
            UpstreamEvent::Closed { reason } => {
                warn!(generation, reason = %reason, "upstream connection closed");
            }
            UpstreamEvent::Error { message } => {
                warn!(generation, error = %message, "upstream connection error");
            }
        }

        self.schedule_from(&[ConnectionState::Connected, ConnectionState::Disconnected]);
    }

    fn retire_current(&self) {
        if let Some(installed) = self.current.write().take() {
            debug!(generation = installed.generation, "retiring upstream connection");
            self.retired.lock().push(installed.connection);
        }
    }

    async fn close_retired(&self) {
        let retired = std::mem::take(&mut *self.retired.lock());
        for connection in retired {
            if let Err(e) = connection.close().await {
                warn!(error = %e, "failed to close stale upstream connection");
            }
        }
    }
}

async fn event_loop<C: Connector>(
    inner: Weak<Inner<C>>,
    mut events_rx: mpsc::UnboundedReceiver<ObservedEvent>,
) {
    while let Some(observed) = events_rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.handle_event(observed);
    }
}
