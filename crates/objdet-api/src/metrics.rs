//! Prometheus metrics for the API server.

use std::sync::LazyLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use regex_lite::Regex;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "objdet_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "objdet_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "objdet_http_requests_in_flight";

    // Pipeline metrics
    pub const UPLOADS_ACCEPTED_TOTAL: &str = "objdet_uploads_accepted_total";
    pub const UPLOADS_REJECTED_TOTAL: &str = "objdet_uploads_rejected_total";
    pub const PREPROCESS_TOTAL: &str = "objdet_preprocess_total";
    pub const DETECTOR_DURATION_SECONDS: &str = "objdet_detector_duration_seconds";
    pub const DETECTIONS_FAILED_TOTAL: &str = "objdet_detections_failed_total";
    pub const PREDICTIONS_PER_IMAGE: &str = "objdet_predictions_per_image";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record an accepted upload.
pub fn record_upload_accepted(extension: &str) {
    let labels = [("extension", extension.to_string())];
    counter!(names::UPLOADS_ACCEPTED_TOTAL, &labels).increment(1);
}

/// Record a rejected upload.
pub fn record_upload_rejected(reason: &str) {
    let labels = [("reason", reason.to_string())];
    counter!(names::UPLOADS_REJECTED_TOTAL, &labels).increment(1);
}

/// Record a preprocessing result (`resized`, `unchanged` or `failed`).
pub fn record_preprocess(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::PREPROCESS_TOTAL, &labels).increment(1);
}

/// Record how long the detector ran.
pub fn record_detector_duration(duration_secs: f64) {
    histogram!(names::DETECTOR_DURATION_SECONDS).record(duration_secs);
}

/// Record a failed detection by error kind.
pub fn record_detection_failed(kind: &str) {
    let labels = [("kind", kind.to_string())];
    counter!(names::DETECTIONS_FAILED_TOTAL, &labels).increment(1);
}

/// Record the number of predictions in one report.
pub fn record_predictions(count: usize) {
    histogram!(names::PREDICTIONS_PER_IMAGE).record(count as f64);
}

static STORED_FILE_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/(uploads|output)/[^/]+$").expect("valid regex"));

static ROOT_FILE_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/[^/]+$").expect("valid regex"));

const KNOWN_ROOT_PATHS: [&str; 6] = ["/upload", "/health", "/healthz", "/ready", "/metrics", "/"];

/// Collapse file names in paths so labels stay low-cardinality.
fn sanitize_path(path: &str) -> String {
    if KNOWN_ROOT_PATHS.contains(&path) {
        return path.to_string();
    }
    if STORED_FILE_PATH.is_match(path) {
        return STORED_FILE_PATH.replace(path, "/$1/:filename").to_string();
    }
    if ROOT_FILE_PATH.is_match(path) {
        return "/:filename".to_string();
    }
    "other".to_string()
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}
