//! Governor-based per-client rate limiting middleware.
//!
//! Clients are keyed by the first `X-Forwarded-For` entry, falling back to
//! the peer address. `/` and `/health` are never limited.

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};

use pb_core::config::RateLimitConfig;

use crate::context::AppContext;
use crate::error::AppError;
use crate::middleware::trace_id::TraceId;

/// A shared rate limiter keyed by client.
pub type ClientLimiter = Arc<DefaultKeyedRateLimiter<String>>;

/// Advertised wait before retrying a limited request.
pub const RETRY_AFTER: Duration = Duration::from_secs(60);

/// How often idle clients are dropped from the limiter.
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

const EXEMPT_PATHS: &[&str] = &["/", "/health"];

/// Create a limiter from config, or `None` when limiting is disabled.
pub fn create_limiter(config: &RateLimitConfig) -> Option<ClientLimiter> {
    if !config.enabled {
        return None;
    }
    let Some(per_minute) = NonZeroU32::new(config.requests_per_minute) else {
        tracing::warn!("rate_limit.requests_per_minute is 0; rate limiting disabled");
        return None;
    };
    let burst = NonZeroU32::new(config.burst_size).unwrap_or(per_minute);
    let quota = Quota::per_minute(per_minute).allow_burst(burst);
    Some(Arc::new(RateLimiter::keyed(quota)))
}

/// Drop cells for clients whose quota has fully replenished.
pub fn prune(limiter: &ClientLimiter) {
    limiter.retain_recent();
    limiter.shrink_to_fit();
}

/// Start a background task that prunes idle clients from the limiter.
///
/// Without this the keyed state grows with every distinct client seen.
pub fn spawn_pruner(limiter: ClientLimiter, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            let before = limiter.len();
            prune(&limiter);
            tracing::trace!(before, after = limiter.len(), "Pruned rate limiter state");
        }
    })
}

/// Key identifying the client for quota purposes.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return forwarded.to_string();
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Rate limiting middleware. Returns 429 with `Retry-After` when exceeded.
pub async fn rate_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(limiter) = &ctx.limiter else {
        return next.run(request).await;
    };
    if EXEMPT_PATHS.contains(&request.uri().path()) {
        return next.run(request).await;
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = client_key(request.headers(), peer);

    if limiter.check_key(&key).is_err() {
        tracing::warn!(client = %key, "Rate limit exceeded");
        let err = AppError::new(pb_core::Error::RateLimited {
            retry_after: RETRY_AFTER,
        });
        let err = match request.extensions().get::<TraceId>() {
            Some(trace) => trace.error(err),
            None => err,
        };
        return err.into_response();
    }

    next.run(request).await
}
