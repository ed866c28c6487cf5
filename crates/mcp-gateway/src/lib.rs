//! # mcp-gateway
//!
//! Exposes a remote MCP server, reached over WebSocket, as a local MCP server on
//! stdio.
//!
//! ## Architecture
//!
//! ```text
//! stdin/stdout ─► GatewayServer ─► RequestDispatcher ─► ConnectionSupervisor ─► upstream
//!                 (server)          (gateway)            (gateway)               (transport)
//! ```
//!
//! The supervisor owns the single upstream connection and reconnects it with
//! exponential backoff whenever it closes, errors, or fails a request at the
//! transport level. Requests arriving while the upstream is down wait a bounded
//! time for it to come back.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mcp_gateway::gateway::{ConnectionSupervisor, ReconnectConfig, RequestDispatcher};
//! use mcp_gateway::server::GatewayServer;
//! use mcp_gateway::transport::WebSocketConnector;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), mcp_gateway::GatewayError> {
//! let connector = WebSocketConnector::new("wss://example.com/ws/functions/search");
//! let supervisor = ConnectionSupervisor::new(connector, ReconnectConfig::default());
//! supervisor.connect().await;
//!
//! let dispatcher = RequestDispatcher::new(supervisor.clone(), Duration::from_secs(10));
//! GatewayServer::new(dispatcher).serve_stdio().await?;
//! supervisor.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod server;
pub mod transport;

pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult, TransportError};
pub use gateway::{ConnectionState, ConnectionSupervisor, ReconnectConfig, RequestDispatcher};
pub use server::GatewayServer;
