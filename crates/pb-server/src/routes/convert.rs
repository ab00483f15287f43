//! Single-shot conversion endpoints.

use axum::extract::multipart::MultipartError;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Deserialize;
use utoipa::ToSchema;

use pb_core::{ConversionOptions, ConversionRequest, Error};

use crate::context::AppContext;
use crate::error::AppError;
use crate::middleware::auth::{Principal, SCOPE_CONVERT_FILE, SCOPE_CONVERT_TEXT};
use crate::middleware::trace_id::TraceId;
use crate::routes::{json_body, text_request, validate_request, ConvertedContent};

/// Request body for text conversion.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ConvertTextRequest {
    /// Text content to convert.
    pub content: String,
    /// Source format; detected from the content when omitted.
    #[serde(default)]
    pub from_format: Option<String>,
    /// Target format (e.g. `html`).
    pub to_format: String,
    #[serde(default)]
    pub options: Option<ConversionOptions>,
}

impl ConvertTextRequest {
    pub fn into_request(self) -> ConversionRequest {
        text_request(self.content, self.from_format, self.to_format, self.options)
    }
}

/// Multipart form accepted by the file endpoint (documentation only).
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct ConvertFileForm {
    /// File to convert.
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
    /// Target format.
    pub to_format: String,
    /// Source format; detected from the file extension when omitted.
    pub from_format: Option<String>,
}

/// POST /api/v1/convert/text
#[utoipa::path(
    post,
    path = "/api/v1/convert/text",
    tag = "Convert",
    request_body = ConvertTextRequest,
    responses(
        (status = 200, description = "Converted content", body = ConvertedContent),
        (status = 400, description = "Unsupported format or invalid request", body = crate::openapi::ErrorResponse),
        (status = 401, description = "Missing or invalid API key", body = crate::openapi::ErrorResponse),
        (status = 422, description = "Pandoc failed", body = crate::openapi::ErrorResponse),
        (status = 504, description = "Conversion timed out", body = crate::openapi::ErrorResponse)
    )
)]
pub async fn convert_text(
    State(ctx): State<AppContext>,
    Extension(principal): Extension<Principal>,
    Extension(trace): Extension<TraceId>,
    payload: Result<Json<ConvertTextRequest>, JsonRejection>,
) -> Result<Json<ConvertedContent>, AppError> {
    principal
        .require_scope(SCOPE_CONVERT_TEXT)
        .map_err(|e| trace.error(e))?;
    let request = json_body(payload).map_err(|e| trace.error(e))?.into_request();
    validate_request(&ctx, &request).map_err(|e| trace.error(e))?;

    let result = ctx
        .converter
        .convert(&request, ctx.converter.default_timeout())
        .await
        .into_result()
        .map_err(|e| trace.error(e))?;
    Ok(Json(ConvertedContent::from(&result)))
}

/// POST /api/v1/convert/file -- returns the converted file as a download.
#[utoipa::path(
    post,
    path = "/api/v1/convert/file",
    tag = "Convert",
    request_body(content = ConvertFileForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Converted file", body = String, content_type = "application/octet-stream"),
        (status = 400, description = "Unsupported format or missing field", body = crate::openapi::ErrorResponse),
        (status = 413, description = "File too large", body = crate::openapi::ErrorResponse),
        (status = 422, description = "Pandoc failed", body = crate::openapi::ErrorResponse)
    )
)]
pub async fn convert_file(
    State(ctx): State<AppContext>,
    Extension(principal): Extension<Principal>,
    Extension(trace): Extension<TraceId>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, AppError> {
    principal
        .require_scope(SCOPE_CONVERT_FILE)
        .map_err(|e| trace.error(e))?;
    let multipart = multipart.map_err(|rejection| {
        trace.error(Error::Validation(rejection.body_text()))
    })?;

    let max = ctx.config.conversion.max_file_size_bytes();
    let form = read_form(multipart)
        .await
        .map_err(|e| trace.error(multipart_error(e, &headers, max)))?;

    let file = form
        .file
        .ok_or_else(|| trace.error(Error::Validation("Missing 'file' field".into())))?;
    let to_format = form
        .to_format
        .ok_or_else(|| trace.error(Error::Validation("Missing 'to_format' field".into())))?;

    let filename = file.filename.unwrap_or_else(|| "document".into());
    let mut request = ConversionRequest::file(file.bytes, filename.clone(), to_format.clone());
    request.source_format = form.from_format.filter(|f| !f.trim().is_empty());
    validate_request(&ctx, &request).map_err(|e| trace.error(e))?;

    let result = ctx
        .converter
        .convert(&request, ctx.converter.default_timeout())
        .await
        .into_result()
        .map_err(|e| trace.error(e))?;

    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        output_filename(&filename, &to_format)
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    let content_type = HeaderValue::from_str(&result.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        result.content,
    )
        .into_response())
}

struct UploadedFile {
    filename: Option<String>,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct FileForm {
    file: Option<UploadedFile>,
    to_format: Option<String>,
    from_format: Option<String>,
}

async fn read_form(mut multipart: Multipart) -> Result<FileForm, MultipartError> {
    let mut form = FileForm::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().map(String::from);
                let bytes = field.bytes().await?.to_vec();
                form.file = Some(UploadedFile { filename, bytes });
            }
            Some("to_format") => form.to_format = Some(field.text().await?.trim().to_string()),
            Some("from_format") => form.from_format = Some(field.text().await?.trim().to_string()),
            _ => {}
        }
    }
    Ok(form)
}

/// A body rejected by the size limit surfaces as a multipart error.
fn multipart_error(err: MultipartError, headers: &HeaderMap, max: u64) -> Error {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        let size = headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(max + 1);
        return Error::FileTooLarge { size, max };
    }
    Error::Validation(format!("Invalid multipart body: {}", err.body_text()))
}

/// `report.docx` + `html` -> `report.html`; names without an extension
/// become `converted.<format>`.
fn output_filename(filename: &str, to_format: &str) -> String {
    let base = std::path::Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);
    let stem = match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => "converted",
    };
    let stem: String = stem
        .chars()
        .map(|c| if c == '"' || c.is_control() { '_' } else { c })
        .collect();
    format!("{stem}.{to_format}")
}
