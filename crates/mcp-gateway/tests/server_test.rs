//! Local stdio endpoint tests, driven over an in-memory duplex pipe.

mod common;

use std::time::Duration;

use common::{reconnect_config, MockConnector};
use mcp_gateway::gateway::{ConnectionSupervisor, RequestDispatcher};
use mcp_gateway::{GatewayResult, GatewayServer, TransportError};
use mcp_gateway_proto::LATEST_PROTOCOL_VERSION;
use serde_json::{json, Value};
use tokio::io::{
    AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf,
};
use tokio::task::JoinHandle;

// ============================================================================
// Test Helpers
// ============================================================================

struct Client {
    writer: WriteHalf<DuplexStream>,
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    server: JoinHandle<GatewayResult<()>>,
}

impl Client {
    async fn start(mock: &MockConnector, connect: bool, wait: Duration) -> Self {
        let supervisor = ConnectionSupervisor::new(mock.clone(), reconnect_config(None));
        if connect {
            supervisor.connect().await;
        }
        let dispatcher = RequestDispatcher::new(supervisor, wait);

        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server_io);
        let server = tokio::spawn(async move {
            GatewayServer::new(dispatcher)
                .serve(server_read, server_write)
                .await
        });

        let (client_read, writer) = tokio::io::split(client_io);
        Self {
            writer,
            lines: BufReader::new(client_read).lines(),
            server,
        }
    }

    async fn connected(mock: &MockConnector) -> Self {
        Self::start(mock, true, Duration::from_secs(5)).await
    }

    async fn send_raw(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn send(&mut self, message: Value) {
        self.send_raw(&message.to_string()).await;
    }

    async fn recv(&mut self) -> Value {
        let line = tokio::time::timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("timed out waiting for response")
            .unwrap()
            .expect("server closed output");
        serde_json::from_str(&line).unwrap()
    }

    async fn request(&mut self, id: i64, method: &str, params: Value) -> Value {
        self.send(json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))
            .await;
        self.recv().await
    }

    async fn finish(mut self) -> GatewayResult<()> {
        self.writer.shutdown().await.unwrap();
        self.server.await.unwrap()
    }
}

fn initialize_params(version: &str) -> Value {
    json!({
        "protocolVersion": version,
        "capabilities": {},
        "clientInfo": {"name": "test-client", "version": "1.0.0"}
    })
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_initialize_reports_gateway_identity() {
    let mock = MockConnector::new();
    let mut client = Client::connected(&mock).await;

    let response = client
        .request(1, "initialize", initialize_params("2024-11-05"))
        .await;

    assert_eq!(response["id"], 1);
    let result = &response["result"];
    assert_eq!(result["serverInfo"]["name"], "mcp-gateway");
    assert_eq!(result["serverInfo"]["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(result["protocolVersion"], "2024-11-05");
    assert!(result["capabilities"]["tools"].is_object());
}

#[tokio::test]
async fn test_initialize_unknown_version_offers_latest() {
    let mock = MockConnector::new();
    let mut client = Client::connected(&mock).await;

    let response = client
        .request(1, "initialize", initialize_params("1999-01-01"))
        .await;

    assert_eq!(response["result"]["protocolVersion"], LATEST_PROTOCOL_VERSION);
}

#[tokio::test]
async fn test_initialize_without_params_is_invalid() {
    let mock = MockConnector::new();
    let mut client = Client::connected(&mock).await;

    client
        .send(json!({"jsonrpc": "2.0", "id": 3, "method": "initialize"}))
        .await;
    let response = client.recv().await;

    assert_eq!(response["error"]["code"], -32602);
}

#[tokio::test]
async fn test_ping_with_string_id() {
    let mock = MockConnector::new();
    let mut client = Client::connected(&mock).await;

    client
        .send(json!({"jsonrpc": "2.0", "id": "abc", "method": "ping"}))
        .await;
    let response = client.recv().await;

    assert_eq!(response["id"], "abc");
    assert_eq!(response["result"], json!({}));
}

#[tokio::test]
async fn test_notifications_get_no_reply() {
    let mock = MockConnector::new();
    let mut client = Client::connected(&mock).await;

    client
        .send(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
        .await;
    client
        .send(json!({"jsonrpc": "2.0", "method": "notifications/cancelled", "params": {"requestId": 1}}))
        .await;
    let response = client.request(9, "ping", json!({})).await;

    assert_eq!(response["id"], 9);
}

// ============================================================================
// Tools
// ============================================================================

#[tokio::test]
async fn test_tools_list_relays_upstream() {
    let mock = MockConnector::new();
    let mut client = Client::connected(&mock).await;

    client
        .send(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}))
        .await;
    let response = client.recv().await;

    assert_eq!(response["result"]["tools"][0]["name"], "echo");
    assert!(response["result"].get("nextCursor").is_none());

    let response = client.request(3, "tools/list", json!({"cursor": "p1"})).await;
    assert_eq!(response["result"]["nextCursor"], "p1-next");
}

#[tokio::test]
async fn test_tools_call_relays_upstream() {
    let mock = MockConnector::new();
    let mut client = Client::connected(&mock).await;

    let response = client
        .request(4, "tools/call", json!({"name": "search", "arguments": {"q": "rust"}}))
        .await;

    assert_eq!(response["result"]["isError"], false);
    assert_eq!(response["result"]["content"][0]["type"], "text");
    assert_eq!(response["result"]["content"][0]["text"], "search via generation 1");
}

#[tokio::test]
async fn test_tools_call_without_name_is_invalid_params() {
    let mock = MockConnector::new();
    let mut client = Client::connected(&mock).await;

    let response = client
        .request(5, "tools/call", json!({"arguments": {}}))
        .await;

    assert_eq!(response["error"]["code"], -32602);
    assert_eq!(mock.calls(), 0);
}

#[tokio::test]
async fn test_upstream_rpc_error_is_relayed() {
    let mock = MockConnector::new();
    mock.push_list_outcome(Err(TransportError::Rpc {
        code: -32050,
        message: "rate limited".into(),
        data: Some(json!({"retryAfter": 3})),
    }));
    let mut client = Client::connected(&mock).await;

    let response = client.request(6, "tools/list", json!({})).await;

    assert_eq!(response["error"]["code"], -32050);
    assert_eq!(response["error"]["message"], "rate limited");
    assert_eq!(response["error"]["data"]["retryAfter"], 3);
}

#[tokio::test]
async fn test_upstream_unavailable() {
    let mock = MockConnector::new();
    mock.fail_forever();
    let mut client = Client::start(&mock, false, Duration::from_millis(100)).await;

    let listed = client.request(7, "tools/list", json!({})).await;
    assert_eq!(listed["error"]["code"], -32003);

    let called = client
        .request(8, "tools/call", json!({"name": "search"}))
        .await;
    assert_eq!(called["result"]["isError"], true);
    let text = called["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("unavailable"), "got {text}");
}

// ============================================================================
// Framing
// ============================================================================

#[tokio::test]
async fn test_unknown_method() {
    let mock = MockConnector::new();
    let mut client = Client::connected(&mock).await;

    let response = client.request(10, "resources/list", json!({})).await;

    assert_eq!(response["error"]["code"], -32601);
    assert_eq!(response["id"], 10);
}

#[tokio::test]
async fn test_malformed_json_gets_parse_error() {
    let mock = MockConnector::new();
    let mut client = Client::connected(&mock).await;

    client.send_raw("{not json").await;
    let response = client.recv().await;

    assert_eq!(response["error"]["code"], -32700);
    assert!(response["id"].is_null());
}

#[tokio::test]
async fn test_wrong_version_is_invalid_request() {
    let mock = MockConnector::new();
    let mut client = Client::connected(&mock).await;

    client
        .send(json!({"jsonrpc": "1.0", "id": 11, "method": "ping"}))
        .await;
    let response = client.recv().await;

    assert_eq!(response["error"]["code"], -32600);
    assert_eq!(response["id"], 11);
}

#[tokio::test]
async fn test_blank_lines_are_skipped() {
    let mock = MockConnector::new();
    let mut client = Client::connected(&mock).await;

    client.send_raw("").await;
    client.send_raw("   ").await;
    let response = client.request(12, "ping", json!({})).await;

    assert_eq!(response["id"], 12);
}

#[tokio::test]
async fn test_slow_call_does_not_block_other_requests() {
    let mock = MockConnector::new();
    mock.set_call_delay(Duration::from_millis(300));
    let mut client = Client::connected(&mock).await;

    client
        .send(json!({"jsonrpc": "2.0", "id": 20, "method": "tools/call", "params": {"name": "slow"}}))
        .await;
    client
        .send(json!({"jsonrpc": "2.0", "id": 21, "method": "ping"}))
        .await;

    assert_eq!(client.recv().await["id"], 21);
    assert_eq!(client.recv().await["id"], 20);
}

#[tokio::test]
async fn test_end_of_input_answers_in_flight_requests() {
    let mock = MockConnector::new();
    mock.set_call_delay(Duration::from_millis(100));
    let mut client = Client::connected(&mock).await;

    client
        .send(json!({"jsonrpc": "2.0", "id": 30, "method": "tools/call", "params": {"name": "slow"}}))
        .await;
    client.writer.shutdown().await.unwrap();

    let response = client.recv().await;
    assert_eq!(response["id"], 30);
    assert_eq!(response["result"]["isError"], false);

    assert!(client.server.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_end_of_input_stops_server() {
    let mock = MockConnector::new();
    let client = Client::connected(&mock).await;

    assert!(client.finish().await.is_ok());
}
