//! Axum HTTP server for image object detection.
//!
//! This crate provides:
//! - The upload-to-predictions pipeline service
//! - HTML and JSON result rendering
//! - Stored and static file serving
//! - Health checks and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod presenter;
pub mod routes;
pub mod services;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::{DetectionOutcome, DetectionPipeline};
pub use state::AppState;
