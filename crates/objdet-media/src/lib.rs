#![deny(unreachable_patterns)]
//! Image and detector plumbing for the objdet service.
//!
//! This crate provides:
//! - Aspect-preserving downscaling of stored uploads
//! - Type-safe detector command building (argument vector, never a shell)
//! - Detector execution with timeout and output capture
//! - Parsing of the detector's text report into predictions

pub mod detector;
pub mod error;
pub mod report;
pub mod resize;

pub use detector::{check_detector, DetectorCommand, DetectorConfig, DetectorOutput, DetectorRunner};
pub use error::{MediaError, MediaResult};
pub use report::{parse_prediction_line, parse_report, HEADER_MARKER};
pub use resize::{adaptive_resize, fit_within, ResizeOutcome, DEFAULT_MAX_DIMENSION};
