//! Model Context Protocol endpoint (JSON-RPC 2.0 over HTTP POST).
//!
//! Exposes the conversion tools and two read-only resources describing the
//! format registry. Requests are authenticated by the same bearer-key
//! middleware as the REST routes.

pub mod protocol;
pub mod tools;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde_json::{json, Value};

use pb_core::formats;

use crate::context::AppContext;
use crate::middleware::auth::Principal;
use protocol::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, INVALID_REQUEST, JSONRPC_VERSION,
    METHOD_NOT_FOUND, PARSE_ERROR,
};

/// Protocol revision announced when the client does not name one.
pub const DEFAULT_PROTOCOL_VERSION: &str = "2025-03-26";

pub const RESOURCE_FORMATS: &str = "formats://list";
pub const RESOURCE_MATRIX: &str = "formats://matrix";

const INSTRUCTIONS: &str = "Document format conversion service backed by Pandoc. \
Use convert_text for inline content and convert_file_base64 for files. \
Read formats://list for supported formats and formats://matrix for the conversion matrix.";

/// POST /mcp
pub async fn mcp_handler(
    State(ctx): State<AppContext>,
    Extension(principal): Extension<Principal>,
    body: Bytes,
) -> Response {
    let value: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            return rpc_error(Value::Null, JsonRpcError::new(PARSE_ERROR, format!("Parse error: {e}")));
        }
    };

    let id = value.get("id").cloned().unwrap_or(Value::Null);
    let request: JsonRpcRequest = match serde_json::from_value(value) {
        Ok(request) => request,
        Err(e) => {
            return rpc_error(id, JsonRpcError::new(INVALID_REQUEST, format!("Invalid request: {e}")));
        }
    };
    if request.jsonrpc != JSONRPC_VERSION {
        return rpc_error(id, JsonRpcError::new(INVALID_REQUEST, "jsonrpc must be \"2.0\""));
    }

    if request.is_notification() {
        tracing::debug!(method = %request.method, "MCP notification");
        return StatusCode::ACCEPTED.into_response();
    }

    tracing::debug!(method = %request.method, "MCP request");
    let id = request.id.clone().unwrap_or(Value::Null);
    match dispatch(&ctx, &principal, request).await {
        Ok(result) => Json(JsonRpcResponse::success(id, result)).into_response(),
        Err(error) => rpc_error(id, error),
    }
}

fn rpc_error(id: Value, error: JsonRpcError) -> Response {
    Json(JsonRpcResponse::failure(id, error)).into_response()
}

async fn dispatch(
    ctx: &AppContext,
    principal: &Principal,
    request: JsonRpcRequest,
) -> Result<Value, JsonRpcError> {
    let params = request.params;
    match request.method.as_str() {
        "initialize" => Ok(initialize(ctx, &params)),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(json!({ "tools": tools::tool_definitions() })),
        "tools/call" => {
            let name = params
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| JsonRpcError::invalid_params("Missing tool name"))?;
            let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
            tools::call_tool(ctx, principal, name, arguments).await
        }
        "resources/list" => Ok(json!({
            "resources": [
                {
                    "uri": RESOURCE_FORMATS,
                    "name": "Supported formats",
                    "description": "JSON list of supported input and output formats",
                    "mimeType": "application/json",
                },
                {
                    "uri": RESOURCE_MATRIX,
                    "name": "Conversion matrix",
                    "description": "Output formats reachable from each input format",
                    "mimeType": "application/json",
                }
            ]
        })),
        "resources/read" => {
            let uri = params
                .get("uri")
                .and_then(Value::as_str)
                .ok_or_else(|| JsonRpcError::invalid_params("Missing resource uri"))?;
            read_resource(uri)
        }
        other => Err(JsonRpcError::new(
            METHOD_NOT_FOUND,
            format!("Method not found: {other}"),
        )),
    }
}

fn initialize(ctx: &AppContext, params: &Value) -> Value {
    let version = params
        .get("protocolVersion")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_PROTOCOL_VERSION);
    json!({
        "protocolVersion": version,
        "capabilities": {
            "tools": {"listChanged": false},
            "resources": {"subscribe": false, "listChanged": false},
        },
        "serverInfo": {
            "name": ctx.config.server.service_name,
            "version": ctx.config.server.service_version,
        },
        "instructions": INSTRUCTIONS,
    })
}

fn read_resource(uri: &str) -> Result<Value, JsonRpcError> {
    let body = match uri {
        RESOURCE_FORMATS => json!(formats::list_formats()),
        RESOURCE_MATRIX => json!(formats::conversion_matrix()),
        other => return Err(JsonRpcError::invalid_params(format!("Unknown resource: {other}"))),
    };
    let text = serde_json::to_string_pretty(&body)
        .map_err(|e| JsonRpcError::new(protocol::INTERNAL_ERROR, e.to_string()))?;
    Ok(json!({
        "contents": [{
            "uri": uri,
            "mimeType": "application/json",
            "text": text,
        }]
    }))
}
