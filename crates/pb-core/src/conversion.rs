//! Conversion data model shared by the executor and the gateway.

use std::fmt;
use std::time::Duration;

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{Error, FormatDirection, Result};
use crate::formats;

/// Maximum number of items accepted in one batch.
pub const MAX_BATCH_ITEMS: usize = 20;

/// PDF engines a caller may request.
pub const PDF_ENGINES: &[&str] = &[
    "pdflatex",
    "xelatex",
    "lualatex",
    "tectonic",
    "wkhtmltopdf",
    "weasyprint",
    "prince",
    "context",
    "pdfroff",
    "typst",
];

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Line wrapping mode passed to Pandoc's `--wrap`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum WrapMode {
    #[default]
    Auto,
    None,
    Preserve,
}

impl WrapMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WrapMode::Auto => "auto",
            WrapMode::None => "none",
            WrapMode::Preserve => "preserve",
        }
    }
}

/// Tunable Pandoc options for a single conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct ConversionOptions {
    pub standalone: bool,
    pub table_of_contents: bool,
    pub number_sections: bool,
    pub wrap: WrapMode,
    pub columns: u32,
    pub pdf_engine: Option<String>,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            standalone: true,
            table_of_contents: false,
            number_sections: false,
            wrap: WrapMode::Auto,
            columns: 80,
            pdf_engine: None,
        }
    }
}

impl ConversionOptions {
    pub fn validate(&self) -> Result<()> {
        if !(1..=1000).contains(&self.columns) {
            return Err(Error::Validation(format!(
                "columns must be between 1 and 1000, got {}",
                self.columns
            )));
        }
        if let Some(engine) = &self.pdf_engine {
            if !PDF_ENGINES.contains(&engine.as_str()) {
                return Err(Error::Validation(format!(
                    "pdf_engine '{engine}' is not allowed (valid: {})",
                    PDF_ENGINES.join(", ")
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// One unit of conversion work.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub content: Vec<u8>,
    /// Original name of an uploaded file, used for format inference.
    pub filename: Option<String>,
    pub source_format: Option<String>,
    pub target_format: String,
    pub options: ConversionOptions,
}

/// Source and target formats after validation, normalized for Pandoc.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFormats {
    pub source: String,
    pub target: String,
}

impl ConversionRequest {
    /// A request for inline text content.
    pub fn text(content: impl Into<String>, target_format: impl Into<String>) -> Self {
        Self {
            content: content.into().into_bytes(),
            filename: None,
            source_format: None,
            target_format: target_format.into(),
            options: ConversionOptions::default(),
        }
    }

    /// A request for an uploaded file.
    pub fn file(
        content: Vec<u8>,
        filename: impl Into<String>,
        target_format: impl Into<String>,
    ) -> Self {
        Self {
            content,
            filename: Some(filename.into()),
            source_format: None,
            target_format: target_format.into(),
            options: ConversionOptions::default(),
        }
    }

    pub fn from_format(mut self, format: impl Into<String>) -> Self {
        self.source_format = Some(format.into());
        self
    }

    pub fn with_options(mut self, options: ConversionOptions) -> Self {
        self.options = options;
        self
    }

    /// Validate the target and resolve the source format.
    ///
    /// The source comes from, in order: the explicit `source_format`, the
    /// filename extension, then content sniffing. A source that cannot be
    /// inferred at all is reported as an unsupported input format.
    pub fn resolve_formats(&self) -> Result<ResolvedFormats> {
        if !formats::is_supported_output(&self.target_format) {
            return Err(Error::unsupported(
                self.target_format.clone(),
                FormatDirection::Output,
            ));
        }

        let source = if let Some(source) = &self.source_format {
            if !formats::is_supported_input(source) {
                return Err(Error::unsupported(source.clone(), FormatDirection::Input));
            }
            formats::normalize(source)
        } else if let Some(name) = &self.filename {
            match formats::format_from_filename(name) {
                Some(format) => format.to_string(),
                None => {
                    let ext = std::path::Path::new(name)
                        .extension()
                        .map(|e| format!(".{}", e.to_string_lossy()))
                        .unwrap_or_else(|| name.clone());
                    return Err(Error::unsupported(ext, FormatDirection::InputExtension));
                }
            }
        } else {
            match formats::sniff_format(&self.content) {
                Some(format) => format.to_string(),
                None => {
                    return Err(Error::unsupported("unknown", FormatDirection::Input));
                }
            }
        };

        Ok(ResolvedFormats {
            source,
            target: formats::normalize(&self.target_format),
        })
    }
}

// ---------------------------------------------------------------------------
// Result & outcome
// ---------------------------------------------------------------------------

/// Output of a successful conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionResult {
    pub content: Vec<u8>,
    pub content_type: String,
    pub is_binary: bool,
    pub source_format: String,
    pub target_format: String,
}

impl ConversionResult {
    /// Content as a JSON-safe string: base64 for binary formats, UTF-8 text
    /// otherwise.
    pub fn encoded_content(&self) -> String {
        if self.is_binary {
            base64::engine::general_purpose::STANDARD.encode(&self.content)
        } else {
            String::from_utf8_lossy(&self.content).into_owned()
        }
    }
}

/// Error classification for failed conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    FormatNotSupported,
    ConversionFailed,
    Timeout,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::FormatNotSupported => "FORMAT_NOT_SUPPORTED",
            ErrorKind::ConversionFailed => "CONVERSION_FAILED",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exactly one of these is produced per conversion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    Success(ConversionResult),
    Failure {
        kind: ErrorKind,
        message: String,
        stderr_excerpt: Option<String>,
    },
    Timeout {
        after: Duration,
    },
}

impl ConversionOutcome {
    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        ConversionOutcome::Failure {
            kind,
            message: message.into(),
            stderr_excerpt: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ConversionOutcome::Success(_))
    }

    /// Error classification, or `None` on success.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            ConversionOutcome::Success(_) => None,
            ConversionOutcome::Failure { kind, .. } => Some(*kind),
            ConversionOutcome::Timeout { .. } => Some(ErrorKind::Timeout),
        }
    }

    /// Human-readable error message, or `None` on success.
    pub fn error_message(&self) -> Option<String> {
        match self {
            ConversionOutcome::Success(_) => None,
            ConversionOutcome::Failure { message, .. } => Some(message.clone()),
            ConversionOutcome::Timeout { after } => Some(format!(
                "Conversion timed out after {}",
                crate::error::describe_seconds(after)
            )),
        }
    }

    /// Fold an error raised before or around execution into an outcome.
    pub fn from_error(err: Error) -> Self {
        match err {
            Error::FormatNotSupported { .. } | Error::FormatRejected(_) => {
                Self::failure(ErrorKind::FormatNotSupported, err.to_string())
            }
            Error::ConversionFailed { message, stderr } => ConversionOutcome::Failure {
                kind: ErrorKind::ConversionFailed,
                message,
                stderr_excerpt: stderr,
            },
            Error::Timeout { after } => ConversionOutcome::Timeout { after },
            other => Self::failure(ErrorKind::InternalError, other.to_string()),
        }
    }

    pub fn into_result(self) -> Result<ConversionResult> {
        match self {
            ConversionOutcome::Success(result) => Ok(result),
            ConversionOutcome::Timeout { after } => Err(Error::Timeout { after }),
            ConversionOutcome::Failure {
                kind,
                message,
                stderr_excerpt,
            } => Err(match kind {
                ErrorKind::FormatNotSupported => Error::FormatRejected(message),
                ErrorKind::ConversionFailed => Error::ConversionFailed {
                    message,
                    stderr: stderr_excerpt,
                },
                ErrorKind::Timeout => Error::Internal(message),
                ErrorKind::InternalError => Error::Internal(message),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BatchItem {
    pub id: String,
    pub request: ConversionRequest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub id: String,
    pub outcome: ConversionOutcome,
}

/// Per-item outcomes in input order, plus summary counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    pub entries: Vec<BatchEntry>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchResult {
    pub fn from_entries(entries: Vec<BatchEntry>) -> Self {
        let succeeded = entries.iter().filter(|e| e.outcome.is_success()).count();
        let total = entries.len();
        Self {
            entries,
            total,
            succeeded,
            failed: total - succeeded,
        }
    }
}

/// Reject batches that are empty, too large, reuse an item id, or carry
/// invalid options for any item.
pub fn validate_batch(items: &[BatchItem]) -> Result<()> {
    if items.is_empty() {
        return Err(Error::Validation("batch must contain at least one item".into()));
    }
    if items.len() > MAX_BATCH_ITEMS {
        return Err(Error::Validation(format!(
            "batch contains {} items; the maximum is {MAX_BATCH_ITEMS}",
            items.len()
        )));
    }
    let mut seen = std::collections::HashSet::with_capacity(items.len());
    for item in items {
        if !seen.insert(item.id.as_str()) {
            return Err(Error::Validation(format!(
                "duplicate batch item id '{}'",
                item.id
            )));
        }
        item.request.options.validate().map_err(|e| match e {
            Error::Validation(msg) => Error::Validation(format!("item '{}': {msg}", item.id)),
            other => other,
        })?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Milestones reported while a conversion runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Starting,
    Converting,
    Finalizing,
    Complete,
}

impl Stage {
    /// Synthetic completion percentage for the stage.
    pub fn progress(&self) -> u8 {
        match self {
            Stage::Starting => 0,
            Stage::Converting => 50,
            Stage::Finalizing => 90,
            Stage::Complete => 100,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Starting => "starting",
            Stage::Converting => "converting",
            Stage::Finalizing => "finalizing",
            Stage::Complete => "complete",
        }
    }
}

/// Event emitted by the streaming adapter. The last event of every stream
/// is either `Complete` or `Error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Progress(Stage),
    Complete(ConversionResult),
    Error { kind: ErrorKind, message: String },
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressEvent::Progress(_))
    }

    /// Event name used on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            ProgressEvent::Progress(_) => "progress",
            ProgressEvent::Complete(_) => "complete",
            ProgressEvent::Error { .. } => "error",
        }
    }

    /// Terminal event for a finished conversion.
    pub fn from_outcome(outcome: ConversionOutcome) -> Self {
        match outcome {
            ConversionOutcome::Success(result) => ProgressEvent::Complete(result),
            other => ProgressEvent::Error {
                kind: other.error_kind().unwrap_or(ErrorKind::InternalError),
                message: other.error_message().unwrap_or_default(),
            },
        }
    }
}
