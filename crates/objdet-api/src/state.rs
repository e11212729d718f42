//! Application state.

use std::sync::Arc;

use crate::config::ApiConfig;
use crate::error::ApiResult;
use crate::services::DetectionPipeline;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub pipeline: Arc<DetectionPipeline>,
}

impl AppState {
    /// Create new application state, making sure storage directories exist.
    pub async fn new(config: ApiConfig) -> ApiResult<Self> {
        let pipeline = DetectionPipeline::from_config(&config);
        pipeline.ensure_dirs().await?;

        Ok(Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
        })
    }
}
