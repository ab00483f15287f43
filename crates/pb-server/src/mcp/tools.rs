//! MCP tool definitions and their execution.
//!
//! Tool failures are not JSON-RPC errors: they come back as a normal result
//! whose payload is `{success: false, error}` and whose `isError` is set.

use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use pb_core::{formats, ConversionOptions, ConversionRequest, ConversionResult};

use crate::context::AppContext;
use crate::mcp::protocol::JsonRpcError;
use crate::middleware::auth::{Principal, SCOPE_CONVERT_FILE, SCOPE_CONVERT_TEXT};
use crate::routes::validate_request;

#[derive(Debug, Deserialize)]
struct ConvertTextArgs {
    content: String,
    from_format: String,
    to_format: String,
    #[serde(default = "default_true")]
    standalone: bool,
    #[serde(default)]
    pdf_engine: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConvertFileArgs {
    file_base64: String,
    filename: String,
    to_format: String,
    #[serde(default)]
    pdf_engine: Option<String>,
}

fn default_true() -> bool {
    true
}

/// The `tools/list` payload.
pub fn tool_definitions() -> Value {
    json!([
        {
            "name": "convert_text",
            "description": "Convert text from one format to another. Use pdf_engine=xelatex for PDF output containing CJK text.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "content": {"type": "string", "description": "The text content to convert"},
                    "from_format": {"type": "string", "description": "Source format (e.g. 'markdown', 'html', 'latex')"},
                    "to_format": {"type": "string", "description": "Target format (e.g. 'html', 'pdf', 'docx')"},
                    "standalone": {"type": "boolean", "default": true, "description": "Generate a standalone document"},
                    "pdf_engine": {"type": "string", "enum": pb_core::PDF_ENGINES, "description": "PDF engine for PDF output"}
                },
                "required": ["content", "from_format", "to_format"]
            }
        },
        {
            "name": "convert_file_base64",
            "description": "Convert a base64-encoded file to another format. The source format is detected from the filename.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "file_base64": {"type": "string", "description": "Base64-encoded file content"},
                    "filename": {"type": "string", "description": "Original filename, used to detect the source format"},
                    "to_format": {"type": "string", "description": "Target format"},
                    "pdf_engine": {"type": "string", "enum": pb_core::PDF_ENGINES, "description": "PDF engine for PDF output"}
                },
                "required": ["file_base64", "filename", "to_format"]
            }
        },
        {
            "name": "list_formats",
            "description": "Get the supported input and output formats.",
            "inputSchema": {"type": "object", "properties": {}}
        },
        {
            "name": "get_service_info",
            "description": "Get the service and Pandoc versions.",
            "inputSchema": {"type": "object", "properties": {}}
        }
    ])
}

/// Run a tool and wrap its payload as an MCP tool result.
pub async fn call_tool(
    ctx: &AppContext,
    principal: &Principal,
    name: &str,
    arguments: Value,
) -> Result<Value, JsonRpcError> {
    let payload = match name {
        "convert_text" => convert_text(ctx, principal, parse_args(arguments)?).await,
        "convert_file_base64" => convert_file_base64(ctx, principal, parse_args(arguments)?).await,
        "list_formats" => json!(formats::list_formats()),
        "get_service_info" => json!({
            "service_version": ctx.config.server.service_version,
            "pandoc_version": ctx.pandoc_version().await,
        }),
        other => return Err(JsonRpcError::invalid_params(format!("Unknown tool: {other}"))),
    };

    let is_error = payload.get("success") == Some(&Value::Bool(false));
    Ok(json!({
        "content": [{"type": "text", "text": payload.to_string()}],
        "structuredContent": payload,
        "isError": is_error,
    }))
}

fn parse_args<T: DeserializeOwned>(arguments: Value) -> Result<T, JsonRpcError> {
    let arguments = if arguments.is_null() { json!({}) } else { arguments };
    serde_json::from_value(arguments)
        .map_err(|e| JsonRpcError::invalid_params(format!("Invalid arguments: {e}")))
}

async fn convert_text(ctx: &AppContext, principal: &Principal, args: ConvertTextArgs) -> Value {
    if let Err(e) = principal.require_scope(SCOPE_CONVERT_TEXT) {
        return failure(e);
    }
    let options = ConversionOptions {
        standalone: args.standalone,
        pdf_engine: args.pdf_engine,
        ..Default::default()
    };
    let request = ConversionRequest::text(args.content, args.to_format)
        .from_format(args.from_format)
        .with_options(options);

    match run(ctx, &request).await {
        Ok(result) => json!({
            "success": true,
            "content": result.encoded_content(),
            "content_type": result.content_type,
            "is_binary": result.is_binary,
        }),
        Err(e) => failure(e),
    }
}

async fn convert_file_base64(ctx: &AppContext, principal: &Principal, args: ConvertFileArgs) -> Value {
    if let Err(e) = principal.require_scope(SCOPE_CONVERT_FILE) {
        return failure(e);
    }
    let engine = base64::engine::general_purpose::STANDARD;
    let bytes = match engine.decode(args.file_base64.trim()) {
        Ok(bytes) => bytes,
        Err(e) => return json!({"success": false, "error": format!("Invalid base64 content: {e}")}),
    };
    let options = ConversionOptions {
        pdf_engine: args.pdf_engine,
        ..Default::default()
    };
    let request = ConversionRequest::file(bytes, args.filename, args.to_format).with_options(options);

    match run(ctx, &request).await {
        Ok(result) => json!({
            "success": true,
            "content_base64": engine.encode(&result.content),
            "content_type": result.content_type,
            "is_binary": result.is_binary,
        }),
        Err(e) => failure(e),
    }
}

async fn run(ctx: &AppContext, request: &ConversionRequest) -> pb_core::Result<ConversionResult> {
    validate_request(ctx, request)?;
    ctx.converter
        .convert(request, ctx.converter.default_timeout())
        .await
        .into_result()
}

fn failure(err: pb_core::Error) -> Value {
    json!({
        "success": false,
        "error": err.to_string(),
        "code": err.code(),
    })
}
