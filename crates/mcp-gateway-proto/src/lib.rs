//! # mcp-gateway-proto
//!
//! Wire types shared by both sides of the MCP gateway.
//!
//! The gateway speaks the same logical protocol downstream (stdio) and upstream
//! (WebSocket): JSON-RPC 2.0 envelopes carrying MCP `initialize`, `ping`,
//! `tools/list` and `tools/call` payloads.
//!
//! ```text
//! ┌────────────┐  JSON-RPC (stdio)  ┌─────────────┐  JSON-RPC (WebSocket)  ┌──────────┐
//! │ MCP client │◄──────────────────►│ mcp-gateway │◄──────────────────────►│ upstream │
//! └────────────┘                    └─────────────┘                        └──────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod jsonrpc;
pub mod lifecycle;
pub mod tools;

pub use error::ProtoError;
pub use jsonrpc::{
    ErrorObject, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, RequestId, JSONRPC_VERSION,
};
pub use lifecycle::{
    negotiate_protocol_version, ClientCapabilities, Implementation, InitializeParams,
    InitializeResult, ServerCapabilities, ToolsCapability, LATEST_PROTOCOL_VERSION,
    SUPPORTED_PROTOCOL_VERSIONS,
};
pub use tools::{CallToolParams, CallToolResult, Content, ListToolsParams, ListToolsResult, Tool};

/// MCP method names used by the gateway.
pub mod methods {
    /// Session handshake.
    pub const INITIALIZE: &str = "initialize";
    /// Sent by the client once `initialize` has completed.
    pub const INITIALIZED: &str = "notifications/initialized";
    /// Request cancellation notice.
    pub const CANCELLED: &str = "notifications/cancelled";
    /// Liveness check, valid in both directions.
    pub const PING: &str = "ping";
    /// List the tools offered by the server.
    pub const TOOLS_LIST: &str = "tools/list";
    /// Invoke a named tool.
    pub const TOOLS_CALL: &str = "tools/call";
}
