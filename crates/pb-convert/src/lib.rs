//! # pb-convert
//!
//! Request-to-subprocess conversion orchestration for pandoc-bridge.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- locate Pandoc and the optional
//!   PDF engines.
//! - **Command execution** ([`ToolCommand`]) -- async builder with deadline,
//!   cancellation, and process-group kill.
//! - **Workspace management** ([`Workspace`]) -- per-request temporary
//!   directory removed on every exit path.
//! - **Admission control** ([`AdmissionControl`]) -- node-wide cap on
//!   concurrent Pandoc processes.
//! - **Execution** ([`ConversionExecutor`]) -- one process per request,
//!   mapped to a [`pb_core::ConversionOutcome`].
//! - **Streaming** ([`ProgressStream`]) and **batching** ([`run_batch`]).
//!
//! [`Converter`] ties these together behind the interface the gateway uses.

pub mod admission;
pub mod args;
pub mod batch;
pub mod command;
pub mod executor;
pub mod progress;
pub mod tools;
pub mod workspace;

#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::time::Duration;

use pb_core::config::Config;
use pb_core::{BatchItem, BatchResult, ConversionOutcome, ConversionRequest};

// ---- Re-exports for convenience ----

pub use admission::{AdmissionControl, ProcessPermit};
pub use batch::run_batch;
pub use command::{ToolCommand, ToolOutput, ToolRun};
pub use executor::{ConversionExecutor, ExecStage};
pub use progress::{spawn_progress, ProgressStream};
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};
pub use workspace::Workspace;

/// Entry point for conversions: direct, streamed, or batched.
#[derive(Debug, Clone)]
pub struct Converter {
    executor: Arc<ConversionExecutor>,
    default_timeout: Duration,
    batch_concurrency: usize,
}

impl Converter {
    pub fn new(
        executor: Arc<ConversionExecutor>,
        default_timeout: Duration,
        batch_concurrency: usize,
    ) -> Self {
        Self {
            executor,
            default_timeout,
            batch_concurrency: batch_concurrency.max(1),
        }
    }

    /// Build a converter from configuration and discovered tools.
    pub fn from_config(config: &Config, tools: &ToolRegistry) -> Self {
        let admission = AdmissionControl::new(config.conversion.max_concurrent_processes);
        let executor = ConversionExecutor::new(tools.pandoc().cloned(), admission)
            .with_temp_root(config.conversion.temp_dir.clone());
        Self::new(
            Arc::new(executor),
            config.conversion.timeout(),
            config.conversion.batch_concurrency,
        )
    }

    pub async fn convert(&self, request: &ConversionRequest, timeout: Duration) -> ConversionOutcome {
        self.executor.convert(request, timeout).await
    }

    /// Stream progress for a conversion using the default timeout.
    pub fn convert_stream(&self, request: ConversionRequest) -> ProgressStream {
        spawn_progress(Arc::clone(&self.executor), request, self.default_timeout)
    }

    /// Run a batch using the default timeout for each item.
    pub async fn convert_batch(&self, items: Vec<BatchItem>) -> pb_core::Result<BatchResult> {
        run_batch(
            Arc::clone(&self.executor),
            items,
            self.default_timeout,
            self.batch_concurrency,
        )
        .await
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn admission(&self) -> &Arc<AdmissionControl> {
        self.executor.admission()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pb_core::config::ToolsConfig;
    use pb_core::ErrorKind;

    fn fake_converter(config: &mut Config) -> Converter {
        config.tools = ToolsConfig {
            pandoc_path: Some("/bin/sh".into()),
            pandoc_args: test_support::fake_tool().args,
        };
        let tools = ToolRegistry::discover(&config.tools);
        Converter::from_config(config, &tools)
    }

    #[tokio::test]
    async fn from_config_applies_limits() {
        let mut config = Config::default();
        config.conversion.max_concurrent_processes = 3;
        config.conversion.timeout_secs = 7;
        let converter = fake_converter(&mut config);
        assert_eq!(converter.admission().limit(), 3);
        assert_eq!(converter.default_timeout(), Duration::from_secs(7));

        let request = ConversionRequest::text("# ok", "html").from_format("markdown");
        assert!(converter.convert(&request, Duration::from_secs(5)).await.is_success());
    }

    #[tokio::test]
    async fn facade_stream_and_batch() {
        let mut config = Config::default();
        let converter = fake_converter(&mut config);

        let events = converter
            .convert_stream(ConversionRequest::text("# s", "html").from_format("markdown"))
            .collect()
            .await;
        assert_eq!(events.len(), 4);

        let result = converter
            .convert_batch(vec![BatchItem {
                id: "only".into(),
                request: ConversionRequest::text("x", "nope"),
            }])
            .await
            .unwrap();
        assert_eq!(
            result.entries[0].outcome.error_kind(),
            Some(ErrorKind::FormatNotSupported)
        );
    }
}
