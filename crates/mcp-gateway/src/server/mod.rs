//! Local MCP endpoint over stdio.
//!
//! One JSON-RPC message per line (newline-delimited JSON). Requests are handled
//! concurrently; responses are written as they complete, so they may be
//! reordered relative to the requests.

use mcp_gateway_proto::jsonrpc::{INVALID_REQUEST, PARSE_ERROR};
use mcp_gateway_proto::{JsonRpcMessage, JsonRpcResponse, ProtoError, RequestId};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::RequestDispatcher;
use crate::transport::Connector;

pub mod handlers;

pub use handlers::{handle_request, SERVER_NAME};

/// Serves MCP to a single local client.
pub struct GatewayServer<C: Connector> {
    dispatcher: RequestDispatcher<C>,
}

impl<C: Connector> GatewayServer<C> {
    /// Create a server forwarding through `dispatcher`.
    #[must_use]
    pub const fn new(dispatcher: RequestDispatcher<C>) -> Self {
        Self { dispatcher }
    }

    /// Serve on the process's stdin and stdout.
    ///
    /// # Errors
    ///
    /// Returns an error if stdin or stdout fails.
    pub async fn serve_stdio(&self) -> GatewayResult<()> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve until `reader` reaches end of input.
    ///
    /// Requests still in flight at end of input are answered before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if reading or writing fails.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> GatewayResult<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (responses, responses_rx) = mpsc::unbounded_channel();
        let writer_task = tokio::spawn(write_responses(writer, responses_rx));

        let mut lines = BufReader::new(reader).lines();
        let mut in_flight = JoinSet::new();

        info!("serving MCP on stdio");

        let read_result = loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break Ok(()),
                Err(e) => {
                    error!(error = %e, "stdin read error");
                    break Err(GatewayError::Io(e));
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            match JsonRpcMessage::from_json(&line) {
                Ok(JsonRpcMessage::Request(request)) => {
                    debug!(id = ?request.id, method = %request.method, "handling request");
                    let dispatcher = self.dispatcher.clone();
                    let responses = responses.clone();
                    in_flight.spawn(async move {
                        if let Some(response) = handle_request(&dispatcher, request).await {
                            let _ = responses.send(response);
                        }
                    });
                }
                Ok(JsonRpcMessage::Response(response)) => {
                    debug!(id = ?response.id, "ignoring response from client");
                }
                Err(ProtoError::Decoding(message)) => {
                    warn!(error = %message, "unparseable message from client");
                    let _ = responses.send(JsonRpcResponse::error(None, PARSE_ERROR, message));
                }
                Err(e) => {
                    warn!(error = %e, "invalid message from client");
                    let _ = responses.send(JsonRpcResponse::error(
                        request_id_of(&line),
                        INVALID_REQUEST,
                        e.to_string(),
                    ));
                }
            }

            while in_flight.try_join_next().is_some() {}
        };

        debug!(pending = in_flight.len(), "input closed, draining requests");
        while in_flight.join_next().await.is_some() {}

        drop(responses);
        let write_result = match writer_task.await {
            Ok(result) => result.map_err(GatewayError::from),
            Err(e) => Err(GatewayError::Io(std::io::Error::other(e))),
        };

        info!("stdio session ended");
        read_result.and(write_result)
    }
}

/// Best-effort id recovery from a frame that is JSON but not valid JSON-RPC.
fn request_id_of(line: &str) -> Option<RequestId> {
    let value: Value = serde_json::from_str(line).ok()?;
    serde_json::from_value(value.get("id")?.clone()).ok()
}

async fn write_responses<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut responses: mpsc::UnboundedReceiver<JsonRpcResponse>,
) -> std::io::Result<()> {
    while let Some(response) = responses.recv().await {
        let json = match response.to_json() {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "failed to encode response");
                continue;
            }
        };
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        debug!(id = ?response.id, "response sent");
    }
    Ok(())
}
