//! Request dispatcher: forwards tool requests over the supervised connection.

use std::sync::Arc;
use std::time::Duration;

use mcp_gateway_proto::{CallToolParams, CallToolResult, ListToolsResult};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::state::ConnectionState;
use super::supervisor::ConnectionSupervisor;
use crate::error::{GatewayError, GatewayResult, TransportError};
use crate::transport::{Connector, UpstreamConnection};

/// Default time a request waits for the upstream to become available.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Forwards `tools/list` and `tools/call` to the upstream.
pub struct RequestDispatcher<C: Connector> {
    supervisor: ConnectionSupervisor<C>,
    wait_timeout: Duration,
}

impl<C: Connector> Clone for RequestDispatcher<C> {
    fn clone(&self) -> Self {
        Self {
            supervisor: self.supervisor.clone(),
            wait_timeout: self.wait_timeout,
        }
    }
}

impl<C: Connector> RequestDispatcher<C> {
    /// Create a dispatcher over `supervisor`.
    #[must_use]
    pub const fn new(supervisor: ConnectionSupervisor<C>, wait_timeout: Duration) -> Self {
        Self {
            supervisor,
            wait_timeout,
        }
    }

    /// The supervisor requests are routed through.
    #[must_use]
    pub const fn supervisor(&self) -> &ConnectionSupervisor<C> {
        &self.supervisor
    }

    /// Wait until a connection is available, up to `timeout`.
    ///
    /// Fails early once the supervisor has given up reconnecting.
    pub async fn wait_for_connection(&self, timeout: Duration) -> GatewayResult<Arc<C::Connection>> {
        let deadline = Instant::now() + timeout;
        let mut changes = self.supervisor.subscribe();

        loop {
            if let Some(connection) = self.supervisor.current() {
                return Ok(connection);
            }

            if self.supervisor.state() == ConnectionState::Failed {
                return Err(GatewayError::RetriesExhausted {
                    attempts: self.supervisor.retry_count(),
                });
            }

            match tokio::time::timeout_at(deadline, changes.changed()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) | Err(_) => {
                    return Err(GatewayError::ConnectionUnavailable { waited: timeout });
                }
            }
        }
    }

    /// Forward `tools/list`.
    ///
    /// # Errors
    ///
    /// Returns an unavailability error if no connection appears within the wait
    /// timeout, otherwise the upstream or transport failure.
    pub async fn list_tools(&self, cursor: Option<String>) -> GatewayResult<ListToolsResult> {
        let connection = self.wait_for_connection(self.wait_timeout).await?;

        match connection.list_tools(cursor).await {
            Ok(result) => Ok(result),
            Err(e) => {
                self.note_failure(&connection, &e, "tools/list");
                Err(e.into())
            }
        }
    }

    /// Forward `tools/call`.
    ///
    /// Never fails: forwarding problems are reported as an error result with
    /// `isError` set, so the client sees them as a failed tool invocation.
    pub async fn call_tool(&self, params: CallToolParams) -> CallToolResult {
        let tool = params.name.clone();

        let connection = match self.wait_for_connection(self.wait_timeout).await {
            Ok(connection) => connection,
            Err(e) => {
                warn!(tool = %tool, error = %e, "tool call not forwarded");
                return CallToolResult::error_text(format!("Error: {e}"));
            }
        };

        match connection.call_tool(params).await {
            Ok(result) => result,
            Err(e) => {
                self.note_failure(&connection, &e, "tools/call");
                CallToolResult::error_text(format!("Error: {e}"))
            }
        }
    }

    fn note_failure(&self, connection: &Arc<C::Connection>, error: &TransportError, method: &str) {
        if error.is_connection_failure() {
            warn!(method, error = %error, "upstream request failed, reconnecting");
            self.supervisor.report_connection_failure(connection);
        } else {
            debug!(method, error = %error, "upstream request failed");
        }
    }
}
