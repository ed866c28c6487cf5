//! Error types for the gateway.

use std::time::Duration;

use mcp_gateway_proto::jsonrpc::{
    INTERNAL_ERROR, INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR, UPSTREAM_TRANSPORT,
    UPSTREAM_UNAVAILABLE,
};
use serde_json::Value;
use thiserror::Error;

/// Failures reported by an upstream transport.
///
/// Classification is explicit: [`TransportError::is_connection_failure`] decides
/// whether a failure says something about the health of the connection itself.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    /// Could not open the connection.
    #[error("connect failed: {0}")]
    Connect(String),

    /// Connection opened but the session handshake failed.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// Connection is closed.
    #[error("connection closed: {0}")]
    Closed(String),

    /// Socket-level read or write failure.
    #[error("socket error: {0}")]
    Socket(String),

    /// No reply within the request timeout.
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Upstream answered with a JSON-RPC error.
    #[error("upstream error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i32,
        /// Error message.
        message: String,
        /// Optional error data.
        data: Option<Value>,
    },

    /// Upstream sent something that could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Whether this failure indicates a broken or unhealthy connection.
    ///
    /// Only these failures trigger reconnection. Upstream JSON-RPC errors and
    /// malformed payloads come from a live peer and leave the connection alone.
    #[must_use]
    pub const fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            Self::Connect(_) | Self::Handshake(_) | Self::Closed(_) | Self::Socket(_) | Self::Timeout(_)
        )
    }
}

/// Errors surfaced by the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Invalid or missing startup configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// No upstream connection became available within the wait timeout.
    #[error("upstream unavailable: no connection within {}ms", .waited.as_millis())]
    ConnectionUnavailable {
        /// How long the request waited.
        waited: Duration,
    },

    /// Reconnection was abandoned after the configured number of retries.
    #[error("upstream unavailable: gave up reconnecting after {attempts} retries")]
    RetriesExhausted {
        /// Retries performed before giving up.
        attempts: u32,
    },

    /// The upstream connection failed while serving the request.
    #[error("upstream transport failure: {0}")]
    Transport(TransportError),

    /// The upstream answered with a JSON-RPC error.
    #[error("upstream error {code}: {message}")]
    Upstream {
        /// JSON-RPC error code.
        code: i32,
        /// Error message.
        message: String,
        /// Optional error data.
        data: Option<Value>,
    },

    /// Malformed inbound request.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// Unknown inbound method.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// JSON parsing/serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TransportError> for GatewayError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Rpc {
                code,
                message,
                data,
            } => Self::Upstream {
                code,
                message,
                data,
            },
            other => Self::Transport(other),
        }
    }
}

impl GatewayError {
    /// Get the JSON-RPC error code for this error.
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::ConnectionUnavailable { .. } | Self::RetriesExhausted { .. } => {
                UPSTREAM_UNAVAILABLE
            }
            Self::Transport(_) => UPSTREAM_TRANSPORT,
            Self::Upstream { code, .. } => *code,
            Self::InvalidParams(_) => INVALID_PARAMS,
            Self::MethodNotFound(_) => METHOD_NOT_FOUND,
            Self::Json(_) => PARSE_ERROR,
            Self::Config(_) | Self::Io(_) => INTERNAL_ERROR,
        }
    }

    /// Optional `data` member for the JSON-RPC error object.
    #[must_use]
    pub fn data(&self) -> Option<Value> {
        match self {
            Self::Upstream { data, .. } => data.clone(),
            _ => None,
        }
    }
}

/// Gateway result type.
pub type GatewayResult<T> = Result<T, GatewayError>;
