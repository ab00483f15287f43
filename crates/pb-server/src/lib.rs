//! pb-server: HTTP gateway for pandoc-bridge.
//!
//! Exposes the converter over:
//!
//! - a REST API (text, file upload, SSE streaming, and batch conversion)
//! - an MCP endpoint speaking JSON-RPC 2.0
//! - a generated OpenAPI document
//!
//! with bearer API key auth, per-client rate limiting, trace IDs, and
//! graceful shutdown via signal handling.

pub mod context;
pub mod error;
pub mod mcp;
pub mod middleware;
pub mod openapi;
pub mod router;
pub mod routes;

use std::net::SocketAddr;

use pb_convert::ToolRegistry;
use pb_core::config::Config;

pub use crate::context::AppContext;
pub use crate::router::build_router;

/// Start the pandoc-bridge server.
///
/// Discovers Pandoc, builds the [`AppContext`], and serves until SIGINT or
/// SIGTERM is received. In-flight requests are allowed to finish.
pub async fn start(config: Config) -> pb_core::Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    let tools = ToolRegistry::discover(&config.tools);
    match tools.pandoc() {
        Some(pandoc) => tracing::info!(
            "Pandoc found: {} ({})",
            pandoc.path.display(),
            pandoc.version().await.as_deref().unwrap_or("unknown version")
        ),
        None => tracing::warn!("Pandoc not found; conversion requests will fail"),
    }

    let host = config.server.host.clone();
    let port = config.server.port;
    let ctx = AppContext::new(config, tools);
    if let Some(limiter) = &ctx.limiter {
        middleware::rate_limit::spawn_pruner(
            limiter.clone(),
            middleware::rate_limit::PRUNE_INTERVAL,
        );
    }
    let app = build_router(ctx);

    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .map_err(|e| pb_core::Error::Internal(format!("Failed to bind to {host}:{port}: {e}")))?;
    let addr = listener
        .local_addr()
        .map_err(|e| pb_core::Error::Io { source: e })?;
    tracing::info!("Starting Pandoc Bridge on {addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| pb_core::Error::Internal(format!("Server error: {e}")))?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
