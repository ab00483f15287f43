//! Route handlers for the HTTP API.

pub mod batch;
pub mod convert;
pub mod formats;
pub mod info;
pub mod stream;

use axum::extract::rejection::JsonRejection;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use pb_core::{ConversionOptions, ConversionRequest, ConversionResult, Error};

use crate::context::AppContext;

/// Converted content as returned in JSON bodies.
#[derive(Debug, Serialize, ToSchema)]
pub struct ConvertedContent {
    /// Converted content (base64 if binary).
    pub content: String,
    /// MIME type of the output.
    pub content_type: String,
    /// Whether `content` is base64-encoded binary.
    pub is_binary: bool,
}

impl From<&ConversionResult> for ConvertedContent {
    fn from(result: &ConversionResult) -> Self {
        Self {
            content: result.encoded_content(),
            content_type: result.content_type.clone(),
            is_binary: result.is_binary,
        }
    }
}

/// Build a text conversion request, treating an empty source as absent.
pub(crate) fn text_request(
    content: String,
    from_format: Option<String>,
    to_format: String,
    options: Option<ConversionOptions>,
) -> ConversionRequest {
    let mut request = ConversionRequest::text(content, to_format)
        .with_options(options.unwrap_or_default());
    request.source_format = from_format.filter(|f| !f.trim().is_empty());
    request
}

/// Reject a request before it reaches the converter: oversized content,
/// invalid options, or formats outside the registry.
pub(crate) fn validate_request(ctx: &AppContext, request: &ConversionRequest) -> pb_core::Result<()> {
    let max = ctx.config.conversion.max_file_size_bytes();
    let size = request.content.len() as u64;
    if size > max {
        return Err(Error::FileTooLarge { size, max });
    }
    request.options.validate()?;
    request.resolve_formats()?;
    Ok(())
}

/// Unwrap a JSON body, reporting malformed input as a validation error.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> pb_core::Result<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| Error::Validation(rejection.body_text()))
}
