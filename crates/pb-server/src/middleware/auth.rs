//! Bearer API key authentication.
//!
//! Validates `Authorization: Bearer <key>` against the configured keys and
//! injects the resulting [`Principal`] into request extensions so handlers
//! can check scopes. When auth is disabled every request gets an anonymous
//! admin principal.

use axum::extract::State;
use axum::http::{header, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::{Local, NaiveDate};

use pb_core::config::{ApiKey, AuthConfig};
use pb_core::Error;

use crate::context::AppContext;
use crate::middleware::trace_id::TraceId;

pub const SCOPE_ADMIN: &str = "admin";
pub const SCOPE_CONVERT_TEXT: &str = "convert:text";
pub const SCOPE_CONVERT_FILE: &str = "convert:file";

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Masked key, safe to log.
    pub subject: String,
    pub scopes: Vec<String>,
}

impl Principal {
    pub fn anonymous() -> Self {
        Self {
            subject: "anonymous".into(),
            scopes: vec![SCOPE_ADMIN.into()],
        }
    }

    /// `admin` satisfies every scope.
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == SCOPE_ADMIN || s == scope)
    }

    pub fn require_scope(&self, scope: &str) -> pb_core::Result<()> {
        if self.has_scope(scope) {
            Ok(())
        } else {
            Err(Error::Forbidden(format!("Missing required scope: {scope}")))
        }
    }
}

/// Resolve a principal from the raw `Authorization` header value.
pub fn authenticate(
    auth_config: &AuthConfig,
    keys: &[ApiKey],
    authorization: Option<&str>,
    today: NaiveDate,
) -> pb_core::Result<Principal> {
    if !auth_config.enabled {
        return Ok(Principal::anonymous());
    }
    if keys.is_empty() {
        return Err(Error::Unauthorized("No API keys configured".into()));
    }

    let authorization = authorization
        .ok_or_else(|| Error::Unauthorized("Missing Authorization header".into()))?;
    let mut parts = authorization.split_whitespace();
    let (Some(scheme), Some(token), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(Error::Unauthorized(
            "Invalid Authorization header format".into(),
        ));
    };
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(Error::Unauthorized(
            "Invalid authentication scheme, expected 'Bearer'".into(),
        ));
    }

    let key = keys
        .iter()
        .find(|k| k.key == token)
        .ok_or_else(|| Error::Unauthorized("Invalid API key".into()))?;
    if key.is_expired(today) {
        let expiry = key.expires.map(|d| d.to_string()).unwrap_or_default();
        return Err(Error::Unauthorized(format!("API key expired on {expiry}")));
    }

    Ok(Principal {
        subject: key.masked(),
        scopes: vec![SCOPE_ADMIN.into()],
    })
}

/// Authentication middleware for protected routes.
pub async fn auth_middleware(
    State(ctx): State<AppContext>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let today = Local::now().date_naive();
    match authenticate(&ctx.config.auth, &ctx.api_keys, authorization, today) {
        Ok(principal) => {
            tracing::debug!(subject = %principal.subject, "Authenticated");
            request.extensions_mut().insert(principal);
            Ok(next.run(request).await)
        }
        Err(e) => {
            let trace = request.extensions().get::<TraceId>().cloned();
            let err = match trace {
                Some(trace) => trace.error(e),
                None => e.into(),
            };
            Err(err.into_response())
        }
    }
}
