//! Upstream transport abstraction.
//!
//! The supervisor only needs to open connections and be told when they die; the
//! dispatcher only needs `tools/list` and `tools/call`. Both are expressed as
//! traits so the reconnection policy can be exercised without a real socket.

use std::future::Future;

use mcp_gateway_proto::{CallToolParams, CallToolResult, ListToolsResult};

use crate::error::TransportError;
use crate::gateway::ConnectionObserver;

pub mod websocket;

pub use websocket::{WebSocketConnection, WebSocketConnector};

/// Opens upstream connections.
///
/// Implementations must not retry on their own; retry policy belongs to the
/// supervisor.
pub trait Connector: Send + Sync + 'static {
    /// The connection type produced.
    type Connection: UpstreamConnection;

    /// Open a connection and complete the session handshake.
    ///
    /// Close and error notifications for the returned connection must be sent
    /// through `observer`.
    fn connect(
        &self,
        observer: ConnectionObserver,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;
}

/// A live upstream session.
pub trait UpstreamConnection: Send + Sync + 'static {
    /// Forward `tools/list`.
    fn list_tools(
        &self,
        cursor: Option<String>,
    ) -> impl Future<Output = Result<ListToolsResult, TransportError>> + Send;

    /// Forward `tools/call`.
    fn call_tool(
        &self,
        params: CallToolParams,
    ) -> impl Future<Output = Result<CallToolResult, TransportError>> + Send;

    /// Close the connection. Must not emit observer notifications.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;
}
