use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use pb_core::{BatchEntry, BatchItem, ConversionOptions, ConversionOutcome, ErrorKind};

use crate::context::AppContext;
use crate::error::AppError;
use crate::middleware::auth::{Principal, SCOPE_CONVERT_TEXT};
use crate::middleware::trace_id::TraceId;
use crate::routes::{json_body, text_request};

#[derive(Debug, Deserialize, ToSchema)]
pub struct BatchRequest {
    /// At most 20 items with unique ids.
    pub items: Vec<BatchItemRequest>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BatchItemRequest {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub from_format: Option<String>,
    pub to_format: String,
    #[serde(default)]
    pub options: Option<ConversionOptions>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BatchItemError {
    pub code: ErrorKind,
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BatchItemResponse {
    pub id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_binary: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<BatchItemError>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BatchResponse {
    /// One entry per item, in request order.
    pub results: Vec<BatchItemResponse>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl From<BatchEntry> for BatchItemResponse {
    fn from(entry: BatchEntry) -> Self {
        match entry.outcome {
            ConversionOutcome::Success(result) => Self {
                id: entry.id,
                success: true,
                content: Some(result.encoded_content()),
                content_type: Some(result.content_type),
                is_binary: Some(result.is_binary),
                error: None,
            },
            failed => Self {
                id: entry.id,
                success: false,
                content: None,
                content_type: None,
                is_binary: None,
                error: Some(BatchItemError {
                    code: failed.error_kind().unwrap_or(ErrorKind::InternalError),
                    message: failed.error_message().unwrap_or_default(),
                }),
            },
        }
    }
}

/// POST /api/v1/convert/batch
///
/// Item failures are reported per item; only a malformed batch fails the
/// whole request.
#[utoipa::path(
    post,
    path = "/api/v1/convert/batch",
    tag = "Convert",
    request_body = BatchRequest,
    responses(
        (status = 200, description = "Per-item results in request order", body = BatchResponse),
        (status = 400, description = "Empty batch, more than 20 items, duplicate ids, or invalid item options", body = crate::openapi::ErrorResponse),
        (status = 401, description = "Missing or invalid API key", body = crate::openapi::ErrorResponse)
    )
)]
pub async fn convert_batch(
    State(ctx): State<AppContext>,
    Extension(principal): Extension<Principal>,
    Extension(trace): Extension<TraceId>,
    payload: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<BatchResponse>, AppError> {
    principal
        .require_scope(SCOPE_CONVERT_TEXT)
        .map_err(|e| trace.error(e))?;
    let body = json_body(payload).map_err(|e| trace.error(e))?;

    let items = body
        .items
        .into_iter()
        .map(|item| BatchItem {
            id: item.id,
            request: text_request(item.content, item.from_format, item.to_format, item.options),
        })
        .collect();

    let result = ctx
        .converter
        .convert_batch(items)
        .await
        .map_err(|e| trace.error(e))?;

    Ok(Json(BatchResponse {
        total: result.total,
        succeeded: result.succeeded,
        failed: result.failed,
        results: result.entries.into_iter().map(Into::into).collect(),
    }))
}
