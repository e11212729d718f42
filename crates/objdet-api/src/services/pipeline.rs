//! Upload-to-predictions pipeline.
//!
//! Stages run in order on the request's task: validate, persist, resize,
//! detect, parse. Resizing never fails the request; every other stage can.

use std::path::{Path, PathBuf};

use objdet_media::{adaptive_resize, parse_report, DetectorConfig};
use objdet_models::{DetectionResult, StoredImage};
use objdet_storage::{UploadStore, UploadValidator};
use tokio::fs;
use tracing::{info, warn};

use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use crate::metrics;

/// Everything produced by a successful detection.
#[derive(Debug, Clone)]
pub struct DetectionOutcome {
    pub stored: StoredImage,
    /// Annotated image file name inside the output directory, if the detector wrote one
    pub output_image: Option<String>,
    /// Raw detector report
    pub report: String,
    pub result: DetectionResult,
}

/// Detection pipeline built from the immutable service config.
#[derive(Debug, Clone)]
pub struct DetectionPipeline {
    validator: UploadValidator,
    store: UploadStore,
    output_dir: PathBuf,
    max_dimension: u32,
    detector: DetectorConfig,
}

impl DetectionPipeline {
    pub fn from_config(config: &ApiConfig) -> Self {
        Self {
            validator: UploadValidator::new(config.allowed_extensions.iter().cloned()),
            store: UploadStore::new(&config.upload_dir),
            output_dir: config.output_dir.clone(),
            max_dimension: config.resize_max_dimension,
            detector: config.detector.clone(),
        }
    }

    pub fn validator(&self) -> &UploadValidator {
        &self.validator
    }

    pub fn upload_dir(&self) -> &Path {
        self.store.root()
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn detector(&self) -> &DetectorConfig {
        &self.detector
    }

    /// Create the upload and output directories.
    pub async fn ensure_dirs(&self) -> ApiResult<()> {
        self.store.ensure_dirs().await?;
        fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| ApiError::internal(format!("cannot create output dir: {}", e)))?;
        Ok(())
    }

    /// Validate, persist and preprocess an upload.
    pub async fn accept(&self, filename: &str, bytes: Vec<u8>) -> ApiResult<StoredImage> {
        let upload = match self.validator.validate(filename, bytes) {
            Ok(upload) => upload,
            Err(e) => {
                let err = ApiError::from(e);
                metrics::record_upload_rejected(err.code());
                return Err(err);
            }
        };
        metrics::record_upload_accepted(&upload.extension);

        let mut stored = self.store.persist(&upload).await?;
        self.preprocess(&mut stored).await;
        Ok(stored)
    }

    /// Best-effort resize; failures are logged and the original image is kept.
    pub async fn preprocess(&self, stored: &mut StoredImage) {
        match adaptive_resize(&stored.path, self.max_dimension).await {
            Ok(outcome) => {
                let (width, height) = outcome.dimensions();
                stored.set_dimensions(width, height);
                metrics::record_preprocess(if outcome.resized() { "resized" } else { "unchanged" });
                info!(key = %stored.storage_key, width, height, resized = outcome.resized(), "Preprocessed upload");
            }
            Err(e) => {
                metrics::record_preprocess("failed");
                warn!(key = %stored.storage_key, error = %e, "Preprocessing failed, continuing with original image");
            }
        }
    }

    /// Run the detector on a stored image and parse its report.
    pub async fn detect(&self, stored: &StoredImage) -> ApiResult<DetectionOutcome> {
        let result = self.detect_inner(stored).await;
        if let Err(e) = &result {
            metrics::record_detection_failed(e.code());
            let stage = match e {
                ApiError::Media(media) if media.is_invocation_error() => "invoke",
                ApiError::Media(media) if media.is_report_error() => "parse",
                _ => "other",
            };
            warn!(key = %stored.storage_key, stage, error = %e, "Detection failed");
        }
        result
    }

    async fn detect_inner(&self, stored: &StoredImage) -> ApiResult<DetectionOutcome> {
        // Absolute paths keep working when the detector runs in its own directory.
        let image_path = fs::canonicalize(&stored.path).await.map_err(objdet_storage::StorageError::from)?;
        let output_dir = fs::canonicalize(&self.output_dir).await.map_err(objdet_storage::StorageError::from)?;
        let output_prefix = output_dir.join(&stored.stem);

        let command = self.detector.command_for(&image_path, &output_prefix);
        let output = self.detector.runner().run(&command).await?;
        metrics::record_detector_duration(output.duration.as_secs_f64());

        let result = parse_report(&output.stdout)?;
        metrics::record_predictions(result.len());

        let output_name = format!("{}.jpg", stored.stem);
        let output_image = match fs::metadata(output_dir.join(&output_name)).await {
            Ok(meta) if meta.is_file() => Some(output_name),
            _ => None,
        };

        info!(
            key = %stored.storage_key,
            predictions = result.len(),
            duration_ms = output.duration.as_millis() as u64,
            "Detection completed"
        );

        Ok(DetectionOutcome {
            stored: stored.clone(),
            output_image,
            report: output.stdout,
            result,
        })
    }

    /// Full pipeline for one upload.
    pub async fn run(&self, filename: &str, bytes: Vec<u8>) -> ApiResult<DetectionOutcome> {
        let stored = self.accept(filename, bytes).await?;
        self.detect(&stored).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use objdet_media::MediaError;
    use objdet_storage::StorageError;
    use tempfile::TempDir;

    fn pipeline(dir: &TempDir, program: PathBuf) -> DetectionPipeline {
        let config = ApiConfig {
            upload_dir: dir.path().join("uploads"),
            output_dir: dir.path().join("output"),
            detector: DetectorConfig {
                program,
                timeout_secs: Some(10),
                ..Default::default()
            },
            ..Default::default()
        };
        DetectionPipeline::from_config(&config)
    }

    #[tokio::test]
    async fn test_rejected_extension_stores_nothing() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir, PathBuf::from("/nonexistent"));
        pipeline.ensure_dirs().await.unwrap();

        let err = pipeline.run("notes.txt", b"hello".to_vec()).await.unwrap_err();
        assert!(matches!(err, ApiError::Storage(StorageError::UnsupportedMediaType(_))));

        let mut entries = fs::read_dir(pipeline.upload_dir()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_undecodable_image_is_still_stored() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir, PathBuf::from("/nonexistent"));
        pipeline.ensure_dirs().await.unwrap();

        let stored = pipeline.accept("dog.png", b"not a png".to_vec()).await.unwrap();
        assert!(stored.path.exists());
        assert_eq!(stored.dimensions(), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unrunnable_detector_is_invocation_error() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let program = dir.path().join("darknet");
        std::fs::write(&program, [0x7fu8, 0x00, 0xde, 0xad, 0xbe, 0xef]).unwrap();
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();

        let pipeline = pipeline(&dir, program);
        pipeline.ensure_dirs().await.unwrap();

        let err = pipeline.run("dog.jpg", b"x".to_vec()).await.unwrap_err();
        assert!(matches!(err, ApiError::Media(MediaError::DetectorFailed { .. })), "{err:?}");
        assert_eq!(err.code(), "invocation_error");
        assert_eq!(err.status_code(), axum::http::StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_missing_detector_is_invocation_error() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir, PathBuf::from("/nonexistent/darknet"));
        pipeline.ensure_dirs().await.unwrap();

        let err = pipeline.run("dog.jpg", b"x".to_vec()).await.unwrap_err();
        assert!(matches!(err, ApiError::Media(MediaError::DetectorNotFound(_))));
        assert_eq!(err.code(), "invocation_error");
    }
}
