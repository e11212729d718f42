//! API configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use objdet_media::{DetectorConfig, DEFAULT_MAX_DIMENSION};
use objdet_storage::DEFAULT_ALLOWED_EXTENSIONS;

/// Room left in the request body for multipart framing around the file.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// API server configuration.
///
/// Built once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Whole-request timeout
    pub request_timeout: Duration,
    /// Largest accepted image, in bytes
    pub max_upload_bytes: usize,
    /// Where uploads are stored
    pub upload_dir: PathBuf,
    /// Where the detector writes annotated images
    pub output_dir: PathBuf,
    /// Only directory served by `GET /:filename`
    pub static_dir: PathBuf,
    /// Accepted extensions, without the dot
    pub allowed_extensions: Vec<String>,
    /// Longest image side kept after preprocessing
    pub resize_max_dimension: u32,
    /// External detector settings
    pub detector: DetectorConfig,
    /// Environment (development/production)
    pub environment: String,
    /// Serve Prometheus metrics at `/metrics`
    pub metrics_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout: Duration::from_secs(180),
            max_upload_bytes: 4 * 1024 * 1024, // 4MB
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("output"),
            static_dir: PathBuf::from("static"),
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            resize_max_dimension: DEFAULT_MAX_DIMENSION,
            detector: DetectorConfig::default(),
            environment: "development".to_string(),
            metrics_enabled: true,
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let default_detector = DetectorConfig::default();

        let detector = DetectorConfig {
            program: env_path("DETECTOR_BIN").unwrap_or(default_detector.program),
            config_file: env_path("DETECTOR_CONFIG").unwrap_or(default_detector.config_file),
            weights_file: env_path("DETECTOR_WEIGHTS").unwrap_or(default_detector.weights_file),
            working_dir: env_path("DETECTOR_WORKDIR").or(default_detector.working_dir),
            timeout_secs: match env_parse::<u64>("DETECTOR_TIMEOUT") {
                Some(0) => None,
                Some(secs) => Some(secs),
                None => default_detector.timeout_secs,
            },
            extra_args: std::env::var("DETECTOR_EXTRA_ARGS")
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or(default_detector.extra_args),
        };

        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: env_parse("API_PORT").unwrap_or(defaults.port),
            request_timeout: env_parse("REQUEST_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            max_upload_bytes: env_parse("MAX_UPLOAD_BYTES").unwrap_or(defaults.max_upload_bytes),
            upload_dir: env_path("UPLOAD_DIR").unwrap_or(defaults.upload_dir),
            output_dir: env_path("OUTPUT_DIR").unwrap_or(defaults.output_dir),
            static_dir: env_path("STATIC_DIR").unwrap_or(defaults.static_dir),
            allowed_extensions: std::env::var("ALLOWED_EXTENSIONS")
                .map(|s| parse_list(&s))
                .unwrap_or(defaults.allowed_extensions),
            resize_max_dimension: env_parse("RESIZE_MAX_DIMENSION")
                .unwrap_or(defaults.resize_max_dimension),
            detector,
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            metrics_enabled: std::env::var("METRICS_ENABLED")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.metrics_enabled),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }

    /// Request body limit: the largest image plus multipart framing.
    pub fn max_body_size(&self) -> usize {
        self.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES)
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ApiConfig::default();
        assert_eq!(config.max_upload_bytes, 4 * 1024 * 1024);
        assert_eq!(config.allowed_extensions, vec!["png", "jpg", "jpeg", "bmp"]);
        assert_eq!(config.resize_max_dimension, 640);
        assert_eq!(config.detector.program, PathBuf::from("./darknet"));
        assert!(!config.is_production());
        assert!(config.metrics_enabled);
        assert!(config.max_body_size() > config.max_upload_bytes);
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" 1 "));
        assert!(parse_flag("TRUE"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag("0"));
    }

    #[test]
    fn test_is_production() {
        let config = ApiConfig {
            environment: "Production".to_string(),
            ..Default::default()
        };
        assert!(config.is_production());
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_list(" png, JPG ,,bmp "), vec!["png", "JPG", "bmp"]);
        assert!(parse_list("").is_empty());
    }
}
