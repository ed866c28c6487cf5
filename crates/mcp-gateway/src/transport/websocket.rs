//! MCP over WebSocket.
//!
//! Each text frame carries one JSON-RPC message. Requests are correlated with
//! their responses by numeric id; the reader task routes responses to the
//! waiting caller and answers upstream `ping` requests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use mcp_gateway_proto::jsonrpc::METHOD_NOT_FOUND;
use mcp_gateway_proto::{
    methods, CallToolParams, CallToolResult, ClientCapabilities, Implementation,
    InitializeParams, InitializeResult, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse,
    ListToolsParams, ListToolsResult, RequestId, LATEST_PROTOCOL_VERSION,
    SUPPORTED_PROTOCOL_VERSIONS,
};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::{Connector, UpstreamConnection};
use crate::error::TransportError;
use crate::gateway::ConnectionObserver;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingReply = oneshot::Sender<Result<Value, TransportError>>;

/// Default bound on opening a connection and completing `initialize`.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on a single upstream request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Name the gateway announces to the upstream.
pub const CLIENT_NAME: &str = "mcp-gateway-client";

/// Opens MCP sessions over WebSocket.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
    headers: Vec<(HeaderName, HeaderValue)>,
    connect_timeout: Duration,
    request_timeout: Duration,
    client_info: Implementation,
}

impl WebSocketConnector {
    /// Create a connector for `url` (`ws://` or `wss://`).
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            client_info: Implementation::new(CLIENT_NAME, env!("CARGO_PKG_VERSION")),
        }
    }

    /// Extra headers sent with the opening handshake.
    #[must_use]
    pub fn with_headers(mut self, headers: Vec<(HeaderName, HeaderValue)>) -> Self {
        self.headers = headers;
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the per-request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Upstream URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn open(&self, observer: ConnectionObserver) -> Result<WebSocketConnection, TransportError> {
        let generation = observer.generation();

        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        for (name, value) in &self.headers {
            request.headers_mut().insert(name.clone(), value.clone());
        }

        let (stream, response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        debug!(generation, status = %response.status(), "websocket upgrade complete");

        let mut connection = WebSocketConnection::spawn(stream, observer, self.request_timeout);
        let result = connection.initialize(&self.client_info).await?;

        info!(
            url = %self.url,
            generation,
            server = %result.server_info.name,
            server_version = %result.server_info.version,
            protocol_version = %result.protocol_version,
            "connected to upstream MCP server"
        );

        connection.server_info = Some(result.server_info);
        connection.protocol_version = Some(result.protocol_version);
        Ok(connection)
    }
}

impl Connector for WebSocketConnector {
    type Connection = WebSocketConnection;

    async fn connect(&self, observer: ConnectionObserver) -> Result<WebSocketConnection, TransportError> {
        match tokio::time::timeout(self.connect_timeout, self.open(observer)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Connect(format!(
                "timed out after {}ms",
                self.connect_timeout.as_millis()
            ))),
        }
    }
}

/// State shared between a connection and its reader task.
#[derive(Default)]
struct Shared {
    pending: Mutex<HashMap<i64, PendingReply>>,
    next_id: AtomicI64,
    /// Set when the gateway itself closes the connection.
    closing: AtomicBool,
    /// Set once the socket is unusable.
    closed: AtomicBool,
}

impl Shared {
    fn fail_pending(&self, error: &TransportError) {
        let pending = std::mem::take(&mut *self.pending.lock());
        for (_, reply) in pending {
            let _ = reply.send(Err(error.clone()));
        }
    }

    fn complete(&self, response: JsonRpcResponse) {
        let id = match &response.id {
            Some(RequestId::Number(id)) => *id,
            other => {
                warn!(id = ?other, "upstream response with unexpected id");
                return;
            }
        };
        let Some(reply) = self.pending.lock().remove(&id) else {
            debug!(id, "upstream response for unknown or expired request");
            return;
        };
        let result = response
            .into_result()
            .map_err(|error| TransportError::Rpc {
                code: error.code,
                message: error.message,
                data: error.data,
            });
        let _ = reply.send(result);
    }
}

/// A live MCP session over WebSocket.
pub struct WebSocketConnection {
    shared: Arc<Shared>,
    outgoing: mpsc::UnboundedSender<Message>,
    request_timeout: Duration,
    generation: u64,
    reader: JoinHandle<()>,
    server_info: Option<Implementation>,
    protocol_version: Option<String>,
}

impl WebSocketConnection {
    fn spawn(stream: WsStream, observer: ConnectionObserver, request_timeout: Duration) -> Self {
        let (write, read) = stream.split();
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());
        let generation = observer.generation();

        tokio::spawn(write_loop(write, outgoing_rx));
        let reader = tokio::spawn(read_loop(
            read,
            Arc::clone(&shared),
            outgoing.clone(),
            observer,
        ));

        Self {
            shared,
            outgoing,
            request_timeout,
            generation,
            reader,
            server_info: None,
            protocol_version: None,
        }
    }

    /// Identity reported by the upstream in `initialize`.
    #[must_use]
    pub fn server_info(&self) -> Option<&Implementation> {
        self.server_info.as_ref()
    }

    /// Protocol revision chosen by the upstream.
    #[must_use]
    pub fn protocol_version(&self) -> Option<&str> {
        self.protocol_version.as_deref()
    }

    /// Generation this connection was opened under.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the socket is still usable.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.shared.closed.load(Ordering::SeqCst)
    }

    async fn initialize(&self, client_info: &Implementation) -> Result<InitializeResult, TransportError> {
        let params = InitializeParams {
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: client_info.clone(),
        };
        let params =
            serde_json::to_value(params).map_err(|e| TransportError::Handshake(e.to_string()))?;

        let result: InitializeResult = self
            .request(methods::INITIALIZE, Some(params))
            .await
            .map_err(|e| match e {
                TransportError::Rpc { message, .. } => TransportError::Handshake(message),
                TransportError::Protocol(message) => TransportError::Handshake(message),
                other => other,
            })?;

        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&result.protocol_version.as_str()) {
            warn!(
                protocol_version = %result.protocol_version,
                "upstream chose an unrecognised protocol revision"
            );
        }

        self.notify(methods::INITIALIZED, None)?;
        Ok(result)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<T, TransportError> {
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let text = JsonRpcRequest::new(id, method, params)
            .to_json()
            .map_err(|e| TransportError::Protocol(e.to_string()))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.shared.pending.lock().insert(id, reply_tx);

        // The reader marks the socket closed before draining, so checking after
        // registering never strands a request.
        if self.shared.closed.load(Ordering::SeqCst) {
            self.shared.pending.lock().remove(&id);
            return Err(TransportError::Closed("connection is closed".to_string()));
        }

        if self.outgoing.send(Message::text(text)).is_err() {
            self.shared.pending.lock().remove(&id);
            return Err(TransportError::Closed("writer stopped".to_string()));
        }

        let value = match tokio::time::timeout(self.request_timeout, reply_rx).await {
            Ok(Ok(result)) => result?,
            Ok(Err(_)) => {
                return Err(TransportError::Closed(
                    "connection dropped before reply".to_string(),
                ));
            }
            Err(_) => {
                self.shared.pending.lock().remove(&id);
                warn!(method, id, "upstream request timed out");
                return Err(TransportError::Timeout(self.request_timeout));
            }
        };

        serde_json::from_value(value)
            .map_err(|e| TransportError::Protocol(format!("invalid {method} result: {e}")))
    }

    fn notify(&self, method: &str, params: Option<Value>) -> Result<(), TransportError> {
        let text = JsonRpcRequest::notification(method, params)
            .to_json()
            .map_err(|e| TransportError::Protocol(e.to_string()))?;
        self.outgoing
            .send(Message::text(text))
            .map_err(|_| TransportError::Closed("writer stopped".to_string()))
    }
}

impl UpstreamConnection for WebSocketConnection {
    async fn list_tools(&self, cursor: Option<String>) -> Result<ListToolsResult, TransportError> {
        let params = serde_json::to_value(ListToolsParams { cursor })
            .map_err(|e| TransportError::Protocol(e.to_string()))?;
        self.request(methods::TOOLS_LIST, Some(params)).await
    }

    async fn call_tool(&self, params: CallToolParams) -> Result<CallToolResult, TransportError> {
        let params =
            serde_json::to_value(params).map_err(|e| TransportError::Protocol(e.to_string()))?;
        self.request(methods::TOOLS_CALL, Some(params)).await
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.shared.closing.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared
            .fail_pending(&TransportError::Closed("connection closed by gateway".to_string()));

        debug!(generation = self.generation, "closing upstream connection");
        // The writer may already be gone if the socket died first.
        let _ = self.outgoing.send(Message::Close(None));
        Ok(())
    }
}

impl Drop for WebSocketConnection {
    fn drop(&mut self) {
        self.shared.closing.store(true, Ordering::SeqCst);
        self.reader.abort();
    }
}

async fn write_loop(
    mut write: SplitSink<WsStream, Message>,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(message) = outgoing.recv().await {
        let is_close = matches!(message, Message::Close(_));
        if let Err(e) = write.send(message).await {
            debug!(error = %e, "upstream write failed");
            break;
        }
        if is_close {
            break;
        }
    }
}

enum ReadOutcome {
    Closed(String),
    Failed(String),
}

async fn read_loop(
    mut read: SplitStream<WsStream>,
    shared: Arc<Shared>,
    outgoing: mpsc::UnboundedSender<Message>,
    observer: ConnectionObserver,
) {
    let outcome = loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => handle_text(&text, &shared, &outgoing),
            Some(Ok(Message::Close(frame))) => {
                let reason = frame.map_or_else(
                    || "closed by upstream".to_string(),
                    |f| format!("closed by upstream ({}): {}", f.code, f.reason),
                );
                break ReadOutcome::Closed(reason);
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => break ReadOutcome::Failed(e.to_string()),
            None => break ReadOutcome::Closed("stream ended".to_string()),
        }
    };

    shared.closed.store(true, Ordering::SeqCst);
    let error = match &outcome {
        ReadOutcome::Closed(reason) => TransportError::Closed(reason.clone()),
        ReadOutcome::Failed(message) => TransportError::Socket(message.clone()),
    };
    shared.fail_pending(&error);

    if shared.closing.load(Ordering::SeqCst) {
        return;
    }
    match outcome {
        ReadOutcome::Closed(reason) => observer.closed(reason),
        ReadOutcome::Failed(message) => observer.error(message),
    }
}

fn handle_text(text: &str, shared: &Shared, outgoing: &mpsc::UnboundedSender<Message>) {
    let message = match JsonRpcMessage::from_json(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "ignoring malformed upstream message");
            return;
        }
    };

    match message {
        JsonRpcMessage::Response(response) => shared.complete(response),
        JsonRpcMessage::Request(request) => {
            let Some(id) = request.id else {
                debug!(method = %request.method, "upstream notification");
                return;
            };
            let response = if request.method == methods::PING {
                JsonRpcResponse::success(Some(id), json!({}))
            } else {
                debug!(method = %request.method, "rejecting upstream request");
                JsonRpcResponse::error(
                    Some(id),
                    METHOD_NOT_FOUND,
                    format!("method not found: {}", request.method),
                )
            };
            match response.to_json() {
                Ok(text) => {
                    let _ = outgoing.send(Message::text(text));
                }
                Err(e) => warn!(error = %e, "failed to encode reply to upstream"),
            }
        }
    }
}
