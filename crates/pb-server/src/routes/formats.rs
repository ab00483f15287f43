use axum::Json;

use pb_core::formats::{self, FormatLists};

/// GET /api/v1/formats -- public, no auth.
#[utoipa::path(
    get,
    path = "/api/v1/formats",
    tag = "Formats",
    responses(
        (status = 200, description = "Supported input and output formats", body = FormatLists)
    )
)]
pub async fn list_formats() -> Json<FormatLists> {
    Json(formats::list_formats())
}
