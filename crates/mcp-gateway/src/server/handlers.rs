//! Request handlers for the local MCP endpoint.
//!
//! Dispatches incoming requests to the gateway's own lifecycle handling or to
//! the upstream via the [`RequestDispatcher`].

use mcp_gateway_proto::{
    methods, negotiate_protocol_version, CallToolParams, ErrorObject, Implementation,
    InitializeParams, InitializeResult, JsonRpcRequest, JsonRpcResponse, ListToolsParams,
    ServerCapabilities, ToolsCapability,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::RequestDispatcher;
use crate::transport::Connector;

/// Name the gateway announces to local clients.
pub const SERVER_NAME: &str = "mcp-gateway";

/// Handle one inbound frame.
///
/// Returns `None` for notifications, which are never answered.
pub async fn handle_request<C: Connector>(
    dispatcher: &RequestDispatcher<C>,
    request: JsonRpcRequest,
) -> Option<JsonRpcResponse> {
    let JsonRpcRequest {
        id, method, params, ..
    } = request;

    let Some(id) = id else {
        handle_notification(&method);
        return None;
    };

    let response = match dispatch(dispatcher, &method, params).await {
        Ok(value) => JsonRpcResponse::success(Some(id), value),
        Err(e) => JsonRpcResponse::from_error(Some(id), error_object(&e)),
    };
    Some(response)
}

/// Convert a gateway error into the JSON-RPC error object sent to the client.
///
/// Upstream errors are relayed with their original code, message and data.
pub fn error_object(error: &GatewayError) -> ErrorObject {
    let message = match error {
        GatewayError::Upstream { message, .. } => message.clone(),
        other => other.to_string(),
    };
    ErrorObject {
        code: error.code(),
        message,
        data: error.data(),
    }
}

async fn dispatch<C: Connector>(
    dispatcher: &RequestDispatcher<C>,
    method: &str,
    params: Option<Value>,
) -> GatewayResult<Value> {
    match method {
        methods::INITIALIZE => initialize(params),
        methods::PING => Ok(json!({})),

        methods::TOOLS_LIST => {
            let params: ListToolsParams = parse_optional_params(params)?;
            let result = dispatcher.list_tools(params.cursor).await?;
            to_json(result)
        }

        methods::TOOLS_CALL => {
            let params: CallToolParams = parse_params(params)?;
            debug!(tool = %params.name, "forwarding tool call");
            to_json(dispatcher.call_tool(params).await)
        }

        _ => Err(GatewayError::MethodNotFound(method.to_string())),
    }
}

fn initialize(params: Option<Value>) -> GatewayResult<Value> {
    let params: InitializeParams = parse_params(params)?;
    let protocol_version = negotiate_protocol_version(&params.protocol_version);

    info!(
        client = %params.client_info.name,
        client_version = %params.client_info.version,
        requested = %params.protocol_version,
        protocol_version,
        "client initialized"
    );

    to_json(InitializeResult {
        protocol_version: protocol_version.to_string(),
        capabilities: ServerCapabilities {
            tools: Some(ToolsCapability::default()),
            ..Default::default()
        },
        server_info: Implementation::new(SERVER_NAME, env!("CARGO_PKG_VERSION")),
        instructions: None,
    })
}

fn handle_notification(method: &str) {
    match method {
        methods::INITIALIZED => debug!("client finished initialization"),
        methods::CANCELLED => debug!("client cancelled a request"),
        other => debug!(method = other, "ignoring notification"),
    }
}

// ─────────────────────────────────────────────────────────────
// Helper functions
// ─────────────────────────────────────────────────────────────

/// Parse required params into a typed struct.
fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> GatewayResult<T> {
    let params = params.ok_or_else(|| GatewayError::InvalidParams("missing params".into()))?;
    serde_json::from_value(params).map_err(|e| GatewayError::InvalidParams(e.to_string()))
}

/// Parse params that may be omitted entirely.
fn parse_optional_params<T: DeserializeOwned + Default>(params: Option<Value>) -> GatewayResult<T> {
    match params {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => {
            serde_json::from_value(value).map_err(|e| GatewayError::InvalidParams(e.to_string()))
        }
    }
}

fn to_json<T: Serialize>(value: T) -> GatewayResult<Value> {
    serde_json::to_value(value).map_err(GatewayError::from)
}
