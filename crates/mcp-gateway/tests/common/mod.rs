//! Shared test helpers: a scripted in-memory connector and a mock WebSocket
//! MCP server.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use mcp_gateway::gateway::{ConnectionObserver, ReconnectConfig};
use mcp_gateway::transport::{Connector, UpstreamConnection};
use mcp_gateway::TransportError;
use mcp_gateway_proto::{
    CallToolParams, CallToolResult, Content, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, Tool,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};

// ============================================================================
// Scripted connector
// ============================================================================

/// Outcome of one scripted connect attempt.
#[derive(Debug, Clone)]
pub enum ConnectOutcome {
    /// Handshake succeeds.
    Succeed,
    /// Connect fails with the given error.
    Fail(TransportError),
}

#[derive(Default)]
struct MockState {
    script: Mutex<VecDeque<ConnectOutcome>>,
    fail_forever: AtomicBool,
    connects: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    connect_times: Mutex<Vec<Instant>>,
    handshake_delay: Mutex<Duration>,
    close_during_handshake: AtomicBool,
    observers: Mutex<Vec<ConnectionObserver>>,
    closed_flags: Mutex<Vec<Arc<AtomicBool>>>,
    call_outcomes: Mutex<VecDeque<Result<CallToolResult, TransportError>>>,
    list_outcomes: Mutex<VecDeque<Result<ListToolsResult, TransportError>>>,
    call_delay: Mutex<Duration>,
    calls: AtomicUsize,
}

/// In-memory [`Connector`] driven by a script of outcomes.
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<MockState>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue outcomes for the next connect attempts; afterwards attempts succeed.
    pub fn script(&self, outcomes: impl IntoIterator<Item = ConnectOutcome>) {
        self.state.script.lock().extend(outcomes);
    }

    /// Make every connect attempt fail.
    pub fn fail_forever(&self) {
        self.state.fail_forever.store(true, Ordering::SeqCst);
    }

    /// Let connect attempts succeed again.
    pub fn recover(&self) {
        self.state.fail_forever.store(false, Ordering::SeqCst);
    }

    pub fn set_handshake_delay(&self, delay: Duration) {
        *self.state.handshake_delay.lock() = delay;
    }

    /// Emit a close event from inside the next successful handshake.
    pub fn close_during_handshake(&self) {
        self.state.close_during_handshake.store(true, Ordering::SeqCst);
    }

    pub fn set_call_delay(&self, delay: Duration) {
        *self.state.call_delay.lock() = delay;
    }

    pub fn push_call_outcome(&self, outcome: Result<CallToolResult, TransportError>) {
        self.state.call_outcomes.lock().push_back(outcome);
    }

    pub fn push_list_outcome(&self, outcome: Result<ListToolsResult, TransportError>) {
        self.state.list_outcomes.lock().push_back(outcome);
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn connect_times(&self) -> Vec<Instant> {
        self.state.connect_times.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    /// Observer handed to the `n`th successful connection.
    pub fn observer(&self, n: usize) -> ConnectionObserver {
        self.state.observers.lock()[n].clone()
    }

    /// Whether the `n`th successful connection has been closed by the gateway.
    pub fn is_closed(&self, n: usize) -> bool {
        self.state.closed_flags.lock()[n].load(Ordering::SeqCst)
    }
}

impl Connector for MockConnector {
    type Connection = MockConnection;

    async fn connect(&self, observer: ConnectionObserver) -> Result<MockConnection, TransportError> {
        let state = &self.state;
        state.connects.fetch_add(1, Ordering::SeqCst);
        state.connect_times.lock().push(Instant::now());
        let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *state.handshake_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        state.in_flight.fetch_sub(1, Ordering::SeqCst);

        let outcome = if state.fail_forever.load(Ordering::SeqCst) {
            ConnectOutcome::Fail(TransportError::Connect("connection refused".into()))
        } else {
            state.script.lock().pop_front().unwrap_or(ConnectOutcome::Succeed)
        };

        match outcome {
            ConnectOutcome::Succeed => {
                if state.close_during_handshake.swap(false, Ordering::SeqCst) {
                    observer.closed("dropped during handshake");
                }
                let closed = Arc::new(AtomicBool::new(false));
                state.observers.lock().push(observer.clone());
                state.closed_flags.lock().push(Arc::clone(&closed));
                Ok(MockConnection {
                    generation: observer.generation(),
                    state: Arc::clone(state),
                    closed,
                })
            }
            ConnectOutcome::Fail(e) => Err(e),
        }
    }
}

/// Connection produced by [`MockConnector`].
pub struct MockConnection {
    pub generation: u64,
    state: Arc<MockState>,
    closed: Arc<AtomicBool>,
}

impl UpstreamConnection for MockConnection {
    async fn list_tools(&self, cursor: Option<String>) -> Result<ListToolsResult, TransportError> {
        if let Some(outcome) = self.state.list_outcomes.lock().pop_front() {
            return outcome;
        }
        Ok(ListToolsResult {
            tools: vec![Tool::new("echo", "Echo the input back")],
            next_cursor: cursor.map(|c| format!("{c}-next")),
        })
    }

    async fn call_tool(&self, params: CallToolParams) -> Result<CallToolResult, TransportError> {
        self.state.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.state.call_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(outcome) = self.state.call_outcomes.lock().pop_front() {
            return outcome;
        }
        Ok(CallToolResult::success(vec![Content::text(format!(
            "{} via generation {}",
            params.name, self.generation
        ))]))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Reconnect policy used by most tests: 1s, 1.5s, 2.25s, ... capped at 30s.
pub fn reconnect_config(max_retries: Option<u32>) -> ReconnectConfig {
    ReconnectConfig {
        max_retries,
        ..ReconnectConfig::default()
    }
}

/// Let spawned tasks run without advancing the clock.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

// ============================================================================
// Mock WebSocket MCP server
// ============================================================================

/// Something the mock server observed.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A connection was accepted, with the value of `x-test-token` if present.
    Accepted { token: Option<String> },
    /// A request or notification arrived.
    Received(JsonRpcRequest),
    /// A reply to a server-initiated request arrived.
    Replied(JsonRpcResponse),
}

/// A mock upstream MCP server bound to an available port.
///
/// Tools:
/// - `echo` returns its `text` argument.
/// - `fail` answers with a JSON-RPC error.
/// - `hang` never answers.
/// - `drop` closes the socket instead of answering.
pub struct MockMcpServer {
    pub addr: SocketAddr,
    pub events: mpsc::UnboundedReceiver<ServerEvent>,
    accepted: Arc<AtomicUsize>,
}

impl MockMcpServer {
    pub async fn start() -> Self {
        Self::start_with(false).await
    }

    /// Start a server that sends a `ping` request after `initialized`.
    pub async fn start_pinging() -> Self {
        Self::start_with(true).await
    }

    async fn start_with(ping_after_init: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (events_tx, events) = mpsc::unbounded_channel();
        let accepted = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&accepted);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve_connection(stream, events_tx.clone(), ping_after_init));
            }
        });

        Self {
            addr,
            events,
            accepted,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Next event, failing the test after five seconds.
    pub async fn next_event(&mut self) -> ServerEvent {
        tokio::time::timeout(Duration::from_secs(5), self.events.recv())
            .await
            .expect("timed out waiting for server event")
            .expect("server event channel closed")
    }
}

async fn serve_connection(
    stream: TcpStream,
    events: mpsc::UnboundedSender<ServerEvent>,
    ping_after_init: bool,
) {
    let mut token = None;
    let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        token = req
            .headers()
            .get("x-test-token")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(resp)
    };
    let Ok(mut ws) = accept_hdr_async(stream, callback).await else {
        return;
    };
    let _ = events.send(ServerEvent::Accepted { token });

    while let Some(Ok(message)) = ws.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        match JsonRpcMessage::from_json(&text) {
            Ok(JsonRpcMessage::Request(request)) => {
                let _ = events.send(ServerEvent::Received(request.clone()));
                if !handle_request(&mut ws, request, ping_after_init).await {
                    return;
                }
            }
            Ok(JsonRpcMessage::Response(response)) => {
                let _ = events.send(ServerEvent::Replied(response));
            }
            Err(_) => {}
        }
    }
}

/// Returns false when the connection should be dropped.
async fn handle_request(
    ws: &mut WebSocketStream<TcpStream>,
    request: JsonRpcRequest,
    ping_after_init: bool,
) -> bool {
    let params = request.params.clone().unwrap_or(Value::Null);
    let reply = match request.method.as_str() {
        "initialize" => Some(JsonRpcResponse::success(
            request.id,
            json!({
                "protocolVersion": params["protocolVersion"],
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "mock-upstream", "version": "0.0.1"}
            }),
        )),
        "notifications/initialized" => {
            if ping_after_init {
                let ping = JsonRpcRequest::new("srv-1", "ping", None);
                let _ = ws.send(Message::text(ping.to_json().unwrap())).await;
            }
            None
        }
        "tools/list" => Some(JsonRpcResponse::success(
            request.id,
            json!({
                "tools": [{
                    "name": "echo",
                    "description": "Echo text",
                    "inputSchema": {"type": "object", "properties": {"text": {"type": "string"}}}
                }],
                "nextCursor": params.get("cursor").and_then(Value::as_str).map(|c| format!("{c}+1"))
            }),
        )),
        "tools/call" => match params["name"].as_str() {
            Some("echo") => Some(JsonRpcResponse::success(
                request.id,
                json!({"content": [{"type": "text", "text": params["arguments"]["text"]}]}),
            )),
            Some("rich") => Some(JsonRpcResponse::success(request.id, rich_call_result())),
            Some("fail") => Some(JsonRpcResponse::error(request.id, -32000, "tool exploded")),
            Some("hang") => None,
            Some("drop") => {
                let _ = ws.close(None).await;
                return false;
            }
            _ => Some(JsonRpcResponse::error(request.id, -32602, "unknown tool")),
        },
        _ => request
            .id
            .map(|id| JsonRpcResponse::error(Some(id), -32601, "method not found")),
    };

    if let Some(reply) = reply {
        if ws.send(Message::text(reply.to_json().unwrap())).await.is_err() {
            return false;
        }
    }
    true
}

/// Tool output with fields and content kinds the gateway does not model, and
/// no `isError` flag.
pub fn rich_call_result() -> Value {
    json!({
        "content": [
            {"type": "widget", "payload": {"rows": [1, 2]}},
            {"type": "text", "text": "hi", "_meta": {"k": 1}}
        ],
        "structuredContent": {"rows": 2}
    })
}
