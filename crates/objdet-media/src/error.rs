//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while preprocessing, detecting or parsing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Detector binary not found: {0}")]
    DetectorNotFound(PathBuf),

    #[error("Detector command failed: {message}")]
    DetectorFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Detector timed out after {0} seconds")]
    Timeout(u64),

    #[error("Detector produced no output")]
    EmptyOutput,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("Preprocessing failed: {0}")]
    Preprocess(String),

    #[error("Malformed detector report: {0}")]
    MalformedReport(String),

    #[error("Malformed prediction on line {line}: {reason} ({content:?})")]
    MalformedPredictionLine {
        line: usize,
        content: String,
        reason: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create a detector failure error.
    pub fn detector_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::DetectorFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn preprocess(message: impl Into<String>) -> Self {
        Self::Preprocess(message.into())
    }

    pub fn malformed_report(message: impl Into<String>) -> Self {
        Self::MalformedReport(message.into())
    }

    pub fn malformed_line(line: usize, content: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedPredictionLine {
            line,
            content: content.into(),
            reason: reason.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether the error came from running the detector rather than reading its report.
    pub fn is_invocation_error(&self) -> bool {
        matches!(
            self,
            Self::DetectorNotFound(_)
                | Self::DetectorFailed { .. }
                | Self::Timeout(_)
                | Self::EmptyOutput
        )
    }

    /// Whether the error came from parsing the detector report.
    pub fn is_report_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedReport(_) | Self::MalformedPredictionLine { .. }
        )
    }
}
