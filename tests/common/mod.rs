//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which builds a full [`AppContext`] whose Pandoc
//! is a scripted stand-in run through `/bin/sh`, so tests do not need Pandoc
//! installed. The [`TestHarness::with_server`] constructor starts Axum on a
//! random port for HTTP-level testing.

#![allow(dead_code)]

use std::net::SocketAddr;

use pb_convert::ToolRegistry;
use pb_core::config::{Config, ToolsConfig};
use pb_server::context::AppContext;
use pb_server::router::build_router;

/// API key accepted by [`test_config`].
pub const API_KEY: &str = "test-key";

/// Version line printed by the fake Pandoc.
pub const FAKE_VERSION: &str = "pandoc 3.1.9";

/// Behaves like Pandoc for the arguments the server generates. Markers in
/// the input select a behaviour: FAIL exits non-zero with stderr, SLEEP
/// hangs, ARGS echoes the argument list into the output. Otherwise the
/// output is `<from>-><to>` followed by the input.
pub const FAKE_PANDOC: &str = r#"
if [ "$1" = "--version" ]; then echo "pandoc 3.1.9"; exit 0; fi
out=""; from=""; to="pdf"; in=""; all="$*"
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift ;;
    -f) from="$2"; shift ;;
    -t) to="$2"; shift ;;
    */input.*) in="$1" ;;
  esac
  shift
done
if grep -q FAIL "$in"; then echo "pandoc: simulated failure" >&2; exit 64; fi
if grep -q SLEEP "$in"; then exec sleep 30; fi
printf '%s->%s\n' "$from" "$to" > "$out"
if grep -q ARGS "$in"; then echo "$all" >> "$out"; fi
cat "$in" >> "$out"
"#;

/// Tools config pointing at the fake Pandoc.
pub fn fake_tools() -> ToolsConfig {
    ToolsConfig {
        pandoc_path: Some("/bin/sh".into()),
        pandoc_args: vec!["-c".into(), FAKE_PANDOC.into(), "pandoc".into()],
    }
}

/// Config with the fake Pandoc, one API key, and rate limiting off.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.tools = fake_tools();
    config.auth.api_keys = API_KEY.into();
    config.rate_limit.enabled = false;
    config.conversion.timeout_secs = 10;
    config.conversion.max_concurrent_processes = 4;
    config
}

pub fn bearer() -> String {
    format!("Bearer {API_KEY}")
}

/// Test harness wrapping a fully-constructed [`AppContext`].
pub struct TestHarness {
    pub ctx: AppContext,
}

impl TestHarness {
    /// Create a new harness with [`test_config`].
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Create a new harness with a custom configuration.
    pub fn with_config(config: Config) -> Self {
        let tools = ToolRegistry::discover(&config.tools);
        Self {
            ctx: AppContext::new(config, tools),
        }
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn with_server() -> (Self, SocketAddr) {
        Self::with_server_config(test_config()).await
    }

    /// Start an Axum server with custom config on a random port.
    pub async fn with_server_config(config: Config) -> (Self, SocketAddr) {
        let harness = Self::with_config(config);
        let app = build_router(harness.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .ok();
        });

        (harness, addr)
    }
}

/// One parsed Server-Sent Event.
#[derive(Debug)]
pub struct SseEvent {
    pub event: String,
    pub data: serde_json::Value,
}

/// Parse a complete `text/event-stream` body, skipping keep-alive comments.
pub fn parse_sse(body: &str) -> Vec<SseEvent> {
    body.split("\n\n")
        .filter_map(|block| {
            let mut event = None;
            let mut data = String::new();
            for line in block.lines() {
                if let Some(name) = line.strip_prefix("event:") {
                    event = Some(name.trim().to_string());
                } else if let Some(chunk) = line.strip_prefix("data:") {
                    data.push_str(chunk.trim_start());
                }
            }
            let event = event?;
            let data = serde_json::from_str(&data).ok()?;
            Some(SseEvent { event, data })
        })
        .collect()
}
