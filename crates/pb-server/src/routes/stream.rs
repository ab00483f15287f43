//! Server-Sent Events conversion endpoint.
//!
//! The request is validated before the stream opens, so an unsupported
//! format is a plain 400. Once streaming, failures arrive as a terminal
//! `error` event. A client disconnect drops the event stream, which cancels
//! the running conversion.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{Extension, Json};
use serde_json::json;

use pb_core::ProgressEvent;

use crate::context::AppContext;
use crate::error::AppError;
use crate::middleware::auth::{Principal, SCOPE_CONVERT_TEXT};
use crate::middleware::trace_id::TraceId;
use crate::routes::convert::ConvertTextRequest;
use crate::routes::{json_body, validate_request, ConvertedContent};

/// POST /api/v1/convert/stream
#[utoipa::path(
    post,
    path = "/api/v1/convert/stream",
    tag = "Convert",
    request_body = ConvertTextRequest,
    responses(
        (status = 200, description = "Named `progress`, `complete` and `error` events", body = String, content_type = "text/event-stream"),
        (status = 400, description = "Unsupported format or invalid request", body = crate::openapi::ErrorResponse),
        (status = 401, description = "Missing or invalid API key", body = crate::openapi::ErrorResponse)
    )
)]
pub async fn convert_stream(
    State(ctx): State<AppContext>,
    Extension(principal): Extension<Principal>,
    Extension(trace): Extension<TraceId>,
    payload: Result<Json<ConvertTextRequest>, JsonRejection>,
) -> Result<Sse<impl futures_core::Stream<Item = Result<Event, Infallible>>>, AppError> {
    principal
        .require_scope(SCOPE_CONVERT_TEXT)
        .map_err(|e| trace.error(e))?;
    let request = json_body(payload).map_err(|e| trace.error(e))?.into_request();
    validate_request(&ctx, &request).map_err(|e| trace.error(e))?;

    let mut events = ctx.converter.convert_stream(request);
    let stream = async_stream::stream! {
        while let Some(event) = events.next_event().await {
            yield Ok(to_sse(&event));
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    ))
}

fn to_sse(event: &ProgressEvent) -> Event {
    let data = match event {
        ProgressEvent::Progress(stage) => json!({
            "stage": stage.as_str(),
            "progress": stage.progress(),
        }),
        ProgressEvent::Complete(result) => json!(ConvertedContent::from(result)),
        ProgressEvent::Error { kind, message } => json!({
            "code": kind.as_str(),
            "message": message,
        }),
    };
    Event::default().event(event.name()).data(data.to_string())
}
