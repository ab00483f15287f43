//! Generated OpenAPI document, served at `/openapi.json`.

use axum::Json;
use serde::Serialize;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, ToSchema};

use crate::routes;

/// Error body shared by every endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorDetail {
    /// Stable code such as `FORMAT_NOT_SUPPORTED` or `TIMEOUT`.
    pub code: String,
    pub message: String,
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
    /// Trace ID of the failed request.
    pub request_id: Option<String>,
}

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Pandoc Bridge",
        description = "Document format conversion service using Pandoc, with REST and MCP interfaces. \
Protected endpoints require `Authorization: Bearer <key>`."
    ),
    paths(
        routes::info::service_info,
        routes::info::health_check,
        routes::formats::list_formats,
        routes::convert::convert_text,
        routes::convert::convert_file,
        routes::stream::convert_stream,
        routes::batch::convert_batch,
    ),
    components(schemas(
        routes::info::ServiceInfo,
        routes::info::HealthCheck,
        routes::ConvertedContent,
        routes::convert::ConvertTextRequest,
        routes::convert::ConvertFileForm,
        routes::batch::BatchRequest,
        routes::batch::BatchItemRequest,
        routes::batch::BatchItemResponse,
        routes::batch::BatchItemError,
        routes::batch::BatchResponse,
        pb_core::formats::FormatLists,
        pb_core::ConversionOptions,
        pb_core::WrapMode,
        pb_core::ErrorKind,
        ErrorResponse,
        ErrorDetail,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "Info", description = "Service information and health checks"),
        (name = "Formats", description = "Format listing"),
        (name = "Convert", description = "Document conversion operations")
    )
)]
pub struct ApiDoc;

/// GET /openapi.json
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
