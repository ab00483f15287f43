//! Runs one Pandoc process per conversion request.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pb_core::formats;
use pb_core::{ConversionOutcome, ConversionRequest, ConversionResult, ErrorKind};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::admission::AdmissionControl;
use crate::args::build_args;
use crate::command::ToolRun;
use crate::tools::ToolConfig;
use crate::workspace::Workspace;

/// Maximum size of the stderr excerpt attached to a failure.
pub const STDERR_EXCERPT_BYTES: usize = 2048;

/// Points in a conversion's life reported to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStage {
    /// The Pandoc process has started.
    Spawned,
    /// The Pandoc process has exited on its own.
    Exited,
}

/// Turns a [`ConversionRequest`] into exactly one [`ConversionOutcome`].
///
/// Stateless per call; the only shared state is the admission control.
#[derive(Debug)]
pub struct ConversionExecutor {
    tool: Option<ToolConfig>,
    admission: Arc<AdmissionControl>,
    temp_root: Option<PathBuf>,
}

impl ConversionExecutor {
    /// `tool` is `None` when Pandoc could not be found; every conversion then
    /// fails with an internal error.
    pub fn new(tool: Option<ToolConfig>, admission: Arc<AdmissionControl>) -> Self {
        Self {
            tool,
            admission,
            temp_root: None,
        }
    }

    /// Place per-request workspaces under `root` instead of the system temp
    /// directory.
    pub fn with_temp_root(mut self, root: Option<PathBuf>) -> Self {
        self.temp_root = root;
        self
    }

    pub fn admission(&self) -> &Arc<AdmissionControl> {
        &self.admission
    }

    pub async fn convert(&self, request: &ConversionRequest, timeout: Duration) -> ConversionOutcome {
        self.convert_observed(request, timeout, &CancellationToken::new(), |_| {})
            .await
    }

    /// Convert, reporting [`ExecStage`]s to `on_stage` and stopping early if
    /// `cancel` fires.
    ///
    /// The deadline starts now and covers the wait for an admission permit.
    /// A cancelled conversion kills the process like a timeout does and ends
    /// as an internal error.
    pub async fn convert_observed(
        &self,
        request: &ConversionRequest,
        timeout: Duration,
        cancel: &CancellationToken,
        mut on_stage: impl FnMut(ExecStage),
    ) -> ConversionOutcome {
        let started = Instant::now();
        let deadline = started + timeout;

        let outcome = match self
            .run(request, timeout, deadline, cancel, &mut on_stage)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => ConversionOutcome::from_error(e),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            ConversionOutcome::Success(result) => tracing::info!(
                source = %result.source_format,
                target = %result.target_format,
                bytes = result.content.len(),
                elapsed_ms,
                "Conversion succeeded"
            ),
            ConversionOutcome::Failure { kind, message, .. } => {
                tracing::warn!(kind = %kind, elapsed_ms, "Conversion failed: {message}")
            }
            ConversionOutcome::Timeout { after } => {
                tracing::warn!(elapsed_ms, "Conversion timed out after {after:?}")
            }
        }
        outcome
    }

    async fn run(
        &self,
        request: &ConversionRequest,
        timeout: Duration,
        deadline: Instant,
        cancel: &CancellationToken,
        on_stage: &mut impl FnMut(ExecStage),
    ) -> pb_core::Result<ConversionOutcome> {
        let resolved = request.resolve_formats()?;
        request.options.validate()?;

        let Some(tool) = &self.tool else {
            return Ok(ConversionOutcome::failure(
                ErrorKind::InternalError,
                "Pandoc is not installed or not found in PATH",
            ));
        };

        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(cancelled()),
            permit = tokio::time::timeout_at(deadline, self.admission.acquire()) => match permit {
                Ok(permit) => permit?,
                Err(_) => {
                    tracing::debug!("Deadline passed while waiting for a process slot");
                    return Ok(ConversionOutcome::Timeout { after: timeout });
                }
            },
        };

        let workspace = Workspace::new(self.temp_root.as_deref())?;
        let input_ext = formats::metadata_for(&resolved.source).extension;
        let target = formats::metadata_for(&resolved.target);
        let input = workspace.write_input(input_ext, &request.content).await?;
        let output = workspace.output_path(target.extension);

        let args = build_args(&resolved, &request.options, &input, &output);
        tracing::debug!(?args, "Running pandoc");

        let mut cmd = tool.command();
        cmd.args(args).deadline(deadline).current_dir(workspace.path());

        let admission = &self.admission;
        let run = cmd
            .run(Some(cancel), || {
                admission.record_spawn();
                on_stage(ExecStage::Spawned);
            })
            .await?;

        let output_status = match run {
            ToolRun::TimedOut => return Ok(ConversionOutcome::Timeout { after: timeout }),
            ToolRun::Cancelled => return Ok(cancelled()),
            ToolRun::Completed(out) => out,
        };
        on_stage(ExecStage::Exited);

        if !output_status.status.success() {
            let stderr = excerpt(&output_status.stderr);
            let message = if stderr.is_empty() {
                format!("Pandoc conversion failed: exited with {}", output_status.status)
            } else {
                format!("Pandoc conversion failed: {stderr}")
            };
            return Ok(ConversionOutcome::Failure {
                kind: ErrorKind::ConversionFailed,
                message,
                stderr_excerpt: (!stderr.is_empty()).then_some(stderr),
            });
        }

        let Some(content) = workspace.read_output(&output).await? else {
            return Ok(ConversionOutcome::failure(
                ErrorKind::ConversionFailed,
                "Pandoc exited successfully but produced no output file",
            ));
        };

        Ok(ConversionOutcome::Success(ConversionResult {
            content,
            content_type: target.content_type.to_string(),
            is_binary: target.is_binary,
            source_format: resolved.source,
            target_format: resolved.target,
        }))
    }
}

fn cancelled() -> ConversionOutcome {
    ConversionOutcome::failure(ErrorKind::InternalError, "Conversion cancelled")
}

/// Trim stderr and bound it to [`STDERR_EXCERPT_BYTES`], cutting on a char
/// boundary.
fn excerpt(stderr: &str) -> String {
    const MARKER: &str = "…";
    let trimmed = stderr.trim();
    if trimmed.len() <= STDERR_EXCERPT_BYTES {
        return trimmed.to_string();
    }
    let mut end = STDERR_EXCERPT_BYTES - MARKER.len();
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{MARKER}", &trimmed[..end])
}
