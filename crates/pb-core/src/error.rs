//! Unified error type for pandoc-bridge.
//!
//! Everything that is not a conversion outcome (validation, auth, config,
//! I/O) funnels into [`Error`], which carries enough context for the gateway
//! to derive an HTTP status via [`Error::http_status`] and a stable
//! machine-readable code via [`Error::code`].

use std::fmt;
use std::time::Duration;

use serde_json::{json, Value};

use crate::formats;

/// Which side of a conversion a format identifier was checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatDirection {
    Input,
    Output,
    /// The format was derived from an uploaded file's extension.
    InputExtension,
}

impl fmt::Display for FormatDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatDirection::Input => f.write_str("input"),
            FormatDirection::Output => f.write_str("output"),
            FormatDirection::InputExtension => f.write_str("input (file extension)"),
        }
    }
}

/// Unified error type covering all failure modes in pandoc-bridge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A format identifier is not in the registry for the given direction.
    #[error("Format '{format}' is not supported as {direction}")]
    FormatNotSupported {
        format: String,
        direction: FormatDirection,
    },

    /// A format was rejected while a conversion was already underway.
    #[error("{0}")]
    FormatRejected(String),

    /// Pandoc ran but did not produce a usable result.
    #[error("{message}")]
    ConversionFailed {
        message: String,
        /// Bounded excerpt of the tool's stderr.
        stderr: Option<String>,
    },

    /// The conversion did not finish before its deadline.
    #[error("Conversion timed out after {}", describe_seconds(.after))]
    Timeout { after: Duration },

    /// The caller is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The caller lacks the scope required for the requested action.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Uploaded content exceeds the configured size cap.
    #[error("File size ({size} bytes) exceeds maximum allowed ({max} bytes)")]
    FileTooLarge { size: u64, max: u64 },

    /// The client exceeded its request quota.
    #[error("Too many requests. Please slow down.")]
    RateLimited { retry_after: Duration },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// An external tool could not be run.
    #[error("Tool error [{tool}]: {message}")]
    Tool { tool: String, message: String },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Render a duration as seconds, keeping fractions for sub-second values.
pub fn describe_seconds(after: &Duration) -> String {
    if after.subsec_millis() == 0 {
        format!("{} seconds", after.as_secs())
    } else {
        format!("{:.1} seconds", after.as_secs_f64())
    }
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::FormatNotSupported { .. } | Error::FormatRejected(_) => 400,
            Error::Validation(_) => 400,
            Error::Unauthorized(_) => 401,
            Error::Forbidden(_) => 403,
            Error::FileTooLarge { .. } => 413,
            Error::ConversionFailed { .. } => 422,
            Error::RateLimited { .. } => 429,
            Error::Timeout { .. } => 504,
            Error::Io { .. } | Error::Tool { .. } | Error::Internal(_) => 500,
        }
    }

    /// Stable error code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::FormatNotSupported { .. } | Error::FormatRejected(_) => "FORMAT_NOT_SUPPORTED",
            Error::ConversionFailed { .. } => "CONVERSION_FAILED",
            Error::Timeout { .. } => "TIMEOUT",
            Error::Unauthorized(_) => "UNAUTHORIZED",
            Error::Forbidden(_) => "FORBIDDEN",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::FileTooLarge { .. } => "FILE_TOO_LARGE",
            Error::RateLimited { .. } => "RATE_LIMITED",
            Error::Io { .. } | Error::Tool { .. } | Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Structured details attached to the API error body, if any.
    pub fn details(&self) -> Option<Value> {
        match self {
            Error::FormatNotSupported { format, direction } => {
                let supported: Vec<&str> = match direction {
                    FormatDirection::Output => formats::OUTPUT_FORMATS.iter().take(10).copied().collect(),
                    _ => formats::INPUT_FORMATS.iter().take(10).copied().collect(),
                };
                Some(json!({
                    "format": format,
                    "format_type": direction.to_string(),
                    "supported_formats": supported,
                }))
            }
            Error::ConversionFailed { stderr: Some(stderr), .. } => {
                Some(json!({ "pandoc_error": stderr }))
            }
            Error::Timeout { after } => Some(json!({ "timeout_seconds": after.as_secs() })),
            Error::FileTooLarge { size, max } => Some(json!({
                "file_size": size,
                "max_size": max,
            })),
            Error::RateLimited { retry_after } => Some(json!({
                "retry_after_seconds": retry_after.as_secs(),
            })),
            _ => None,
        }
    }

    /// Convenience constructor for [`Error::FormatNotSupported`].
    pub fn unsupported(format: impl Into<String>, direction: FormatDirection) -> Self {
        Error::FormatNotSupported {
            format: format.into(),
            direction,
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_not_supported_display() {
        let err = Error::unsupported("klingon", FormatDirection::Output);
        assert_eq!(err.to_string(), "Format 'klingon' is not supported as output");
        assert_eq!(err.http_status(), 400);
        assert_eq!(err.code(), "FORMAT_NOT_SUPPORTED");
    }

    #[test]
    fn format_not_supported_details_list_ten_formats() {
        let err = Error::unsupported(".xyz", FormatDirection::InputExtension);
        let details = err.details().unwrap();
        assert_eq!(details["format_type"], "input (file extension)");
        assert_eq!(details["supported_formats"].as_array().unwrap().len(), 10);
    }

    #[test]
    fn conversion_failed_carries_stderr() {
        let err = Error::ConversionFailed {
            message: "Pandoc conversion failed: bad input".into(),
            stderr: Some("bad input".into()),
        };
        assert_eq!(err.http_status(), 422);
        assert_eq!(err.details().unwrap()["pandoc_error"], "bad input");
    }

    #[test]
    fn timeout_display() {
        let err = Error::Timeout {
            after: Duration::from_secs(60),
        };
        assert_eq!(err.to_string(), "Conversion timed out after 60 seconds");
        assert_eq!(err.http_status(), 504);
        assert_eq!(err.code(), "TIMEOUT");
    }

    #[test]
    fn sub_second_timeout_keeps_fraction() {
        let err = Error::Timeout {
            after: Duration::from_millis(300),
        };
        assert_eq!(err.to_string(), "Conversion timed out after 0.3 seconds");
        assert_eq!(describe_seconds(&Duration::from_millis(1500)), "1.5 seconds");
    }

    #[test]
    fn auth_errors() {
        let err = Error::Unauthorized("Invalid API key".into());
        assert_eq!(err.to_string(), "Unauthorized: Invalid API key");
        assert_eq!(err.http_status(), 401);

        let err = Error::Forbidden("missing scope convert:file".into());
        assert_eq!(err.http_status(), 403);
        assert_eq!(err.code(), "FORBIDDEN");
    }

    #[test]
    fn file_too_large() {
        let err = Error::FileTooLarge { size: 11, max: 10 };
        assert_eq!(err.http_status(), 413);
        assert_eq!(err.code(), "FILE_TOO_LARGE");
    }

    #[test]
    fn rate_limited_details() {
        let err = Error::RateLimited {
            retry_after: Duration::from_secs(60),
        };
        assert_eq!(err.http_status(), 429);
        assert_eq!(err.details().unwrap()["retry_after_seconds"], 60);
    }

    #[test]
    fn io_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io { .. }));
        assert_eq!(err.http_status(), 500);
        assert_eq!(err.code(), "INTERNAL_ERROR");
    }

    #[test]
    fn tool_display() {
        let err = Error::tool("pandoc", "not found");
        assert_eq!(err.to_string(), "Tool error [pandoc]: not found");
        assert!(err.details().is_none());
    }
}
