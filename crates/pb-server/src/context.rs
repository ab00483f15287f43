//! Shared application context.
//!
//! [`AppContext`] is cloned into every handler via Axum state. Everything in
//! it is immutable after startup except the admission counters inside the
//! converter and the rate limiter's per-client cells.

use std::sync::Arc;
use std::time::Instant;

use pb_convert::{Converter, ToolRegistry};
use pb_core::config::{ApiKey, Config};
use tokio::sync::OnceCell;

use crate::middleware::rate_limit::{create_limiter, ClientLimiter};

/// Reported in place of a version when Pandoc cannot be run.
pub const NOT_INSTALLED: &str = "not installed";

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub converter: Converter,
    pub tools: Arc<ToolRegistry>,
    /// Keys parsed once from `auth.api_keys`.
    pub api_keys: Arc<Vec<ApiKey>>,
    /// `None` when rate limiting is disabled.
    pub limiter: Option<ClientLimiter>,
    pandoc_version: Arc<OnceCell<String>>,
    pub started_at: Instant,
}

impl AppContext {
    pub fn new(config: Config, tools: ToolRegistry) -> Self {
        let converter = Converter::from_config(&config, &tools);
        let api_keys = config.auth.parsed_keys();
        let limiter = create_limiter(&config.rate_limit);
        Self {
            config: Arc::new(config),
            converter,
            tools: Arc::new(tools),
            api_keys: Arc::new(api_keys),
            limiter,
            pandoc_version: Arc::new(OnceCell::new()),
            started_at: Instant::now(),
        }
    }

    /// Pandoc's version line, queried on first use and cached.
    pub async fn pandoc_version(&self) -> &str {
        self.pandoc_version
            .get_or_init(|| async {
                match self.tools.pandoc() {
                    Some(tool) => tool
                        .version()
                        .await
                        .unwrap_or_else(|| NOT_INSTALLED.to_string()),
                    None => NOT_INSTALLED.to_string(),
                }
            })
            .await
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("converter", &self.converter)
            .field("api_keys", &self.api_keys.len())
            .field("rate_limited", &self.limiter.is_some())
            .finish_non_exhaustive()
    }
}
