//! Trace ID middleware.
//!
//! Extracts an existing `X-Trace-ID` header (or generates a short one),
//! runs the request inside a tracing span carrying it, and returns it in the
//! response together with `X-Response-Time`.

use std::time::Instant;

use axum::http::{HeaderName, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::AppError;

/// Header name used for the trace identifier.
pub static X_TRACE_ID: HeaderName = HeaderName::from_static("x-trace-id");

/// Header carrying the handling time, e.g. `12.34ms`.
pub static X_RESPONSE_TIME: HeaderName = HeaderName::from_static("x-response-time");

/// Middleware that generates or extracts a trace ID.
pub async fn trace_id_middleware(mut request: Request<axum::body::Body>, next: Next) -> Response {
    let id = request
        .headers()
        .get(&X_TRACE_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(String::from)
        .unwrap_or_else(generate);

    // Store in request extensions so handlers can access it.
    request.extensions_mut().insert(TraceId(id.clone()));

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let span = tracing::info_span!("request", trace_id = %id);
    let start = Instant::now();

    let mut response = async {
        tracing::info!("{method} {path} started");
        let response = next.run(request).await;
        tracing::info!(
            status = response.status().as_u16(),
            "{method} {path} completed in {:.2}ms",
            elapsed_ms(start)
        );
        response
    }
    .instrument(span)
    .await;

    if let Ok(val) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(X_TRACE_ID.clone(), val);
    }
    if let Ok(val) = HeaderValue::from_str(&format!("{:.2}ms", elapsed_ms(start))) {
        response.headers_mut().insert(X_RESPONSE_TIME.clone(), val);
    }

    response
}

fn generate() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Extracted trace ID from the request extensions.
#[derive(Debug, Clone)]
pub struct TraceId(pub String);

impl TraceId {
    /// Attach this trace ID to an error response.
    pub fn error(&self, err: impl Into<AppError>) -> AppError {
        err.into().with_request_id(self.0.clone())
    }
}
