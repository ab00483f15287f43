//! Error-to-HTTP response conversion.
//!
//! Wraps [`pb_core::Error`] so handlers can return `Result<T, AppError>` and
//! get the uniform `{"error": {code, message, details, request_id}}` body.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{json, Map, Value};

/// Wrapper so we can implement `IntoResponse` for an external type.
#[derive(Debug)]
pub struct AppError {
    inner: pb_core::Error,
    request_id: Option<String>,
}

impl AppError {
    pub fn new(inner: pb_core::Error) -> Self {
        Self {
            inner,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn inner(&self) -> &pb_core::Error {
        &self.inner
    }

    /// Message without the variant prefix that `Display` adds.
    fn message(&self) -> String {
        match &self.inner {
            pb_core::Error::Unauthorized(msg)
            | pb_core::Error::Forbidden(msg)
            | pb_core::Error::Validation(msg) => msg.clone(),
            other => other.to_string(),
        }
    }

    /// The JSON error body.
    pub fn body(&self) -> Value {
        let mut error = Map::new();
        error.insert("code".into(), json!(self.inner.code()));
        error.insert("message".into(), json!(self.message()));
        if let Some(details) = self.inner.details() {
            error.insert("details".into(), details);
        }
        if let Some(id) = &self.request_id {
            error.insert("request_id".into(), json!(id));
        }
        json!({ "error": error })
    }
}

impl From<pb_core::Error> for AppError {
    fn from(e: pb_core::Error) -> Self {
        Self::new(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.inner.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error = %self.inner,
                "Server error in API handler"
            );
        } else {
            tracing::warn!("Request error: {} - {}", self.inner.code(), self.message());
        }

        let mut response = (status, axum::Json(self.body())).into_response();
        if let pb_core::Error::RateLimited { retry_after } = &self.inner {
            if let Ok(value) = HeaderValue::from_str(&retry_after.as_secs().to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
