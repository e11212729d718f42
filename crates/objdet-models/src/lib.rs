//! Shared data models for the objdet detection service.
//!
//! This crate provides Serde-serializable types for:
//! - Validated uploads and their stored copies
//! - Detector predictions (label, confidence, bounding box, size)
//! - Ordered detection results as returned to clients

pub mod prediction;
pub mod upload;

// Re-export common types
pub use prediction::{BoundingBox, DetectionResult, Geometry, Prediction};
pub use upload::{StoredImage, UploadedImage};
