//! Stored and static file serving.

use std::path::Path;

use axum::extract::{Path as UrlPath, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use objdet_storage::resolve_within;
use tokio::fs;
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// GET /uploads/:filename
pub async fn uploaded_file(
    State(state): State<AppState>,
    UrlPath(filename): UrlPath<String>,
) -> ApiResult<Response> {
    serve_from(&state.config.upload_dir, &filename, "private, max-age=300").await
}

/// GET /output/:filename
pub async fn output_file(
    State(state): State<AppState>,
    UrlPath(filename): UrlPath<String>,
) -> ApiResult<Response> {
    serve_from(&state.config.output_dir, &filename, "private, max-age=300").await
}

/// GET /:filename - files from the static root only.
pub async fn static_file(
    State(state): State<AppState>,
    UrlPath(filename): UrlPath<String>,
) -> ApiResult<Response> {
    serve_from(&state.config.static_dir, &filename, "public, max-age=3600").await
}

async fn serve_from(root: &Path, filename: &str, cache_control: &'static str) -> ApiResult<Response> {
    let path = resolve_within(root, filename).await.map_err(|e| {
        debug!(filename = %filename, error = %e, "Refusing file request");
        ApiError::not_found(filename.to_string())
    })?;

    let bytes = fs::read(&path)
        .await
        .map_err(|_| ApiError::not_found(filename.to_string()))?;

    Ok((
        [(CONTENT_TYPE, content_type_for(filename)), (CACHE_CONTROL, cache_control)],
        bytes,
    )
        .into_response())
}

/// Content type from the file extension.
pub fn content_type_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "bmp" => "image/bmp",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "svg" => "image/svg+xml",
        "css" => "text/css; charset=utf-8",
        "js" => "text/javascript; charset=utf-8",
        "html" | "htm" => "text/html; charset=utf-8",
        "txt" => "text/plain; charset=utf-8",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}
