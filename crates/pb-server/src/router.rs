//! Axum router construction.
//!
//! Builds the full application router with the public and protected route
//! groups and the middleware stack.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::context::AppContext;
use crate::mcp;
use crate::middleware::auth::auth_middleware;
use crate::middleware::rate_limit::rate_limit_middleware;
use crate::middleware::trace_id::trace_id_middleware;
use crate::openapi;
use crate::routes;

/// Headroom over the file cap for base64 expansion and multipart framing.
const BODY_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let max_file = usize::try_from(ctx.config.conversion.max_file_size_bytes()).unwrap_or(usize::MAX);
    let body_limit = (max_file / 3)
        .saturating_mul(4)
        .saturating_add(BODY_OVERHEAD_BYTES);

    // Public routes -- no auth.
    let public_routes = Router::new()
        .route("/", get(routes::info::service_info))
        .route("/health", get(routes::info::health_check))
        .route("/api/v1/formats", get(routes::formats::list_formats))
        .route("/openapi.json", get(openapi::openapi_json));

    // Protected routes.
    let protected_routes = Router::new()
        .route("/api/v1/convert/text", post(routes::convert::convert_text))
        .route("/api/v1/convert/file", post(routes::convert::convert_file))
        .route("/api/v1/convert/stream", post(routes::stream::convert_stream))
        .route("/api/v1/convert/batch", post(routes::batch::convert_batch))
        .route("/mcp", post(mcp::mcp_handler))
        .route_layer(middleware::from_fn_with_state(ctx.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn_with_state(ctx.clone(), rate_limit_middleware))
        .layer(middleware::from_fn(trace_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(ctx)
}
