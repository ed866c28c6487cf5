//! Error types for the mcp-gateway-proto crate.

use thiserror::Error;

/// Errors that can occur while encoding or decoding protocol frames.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Failed to encode a message.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Failed to decode a message.
    #[error("decoding error: {0}")]
    Decoding(String),

    /// Frame is valid JSON but not a JSON-RPC 2.0 message.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
