//! Image upload handler.

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{debug, info};

use crate::error::{ApiError, ApiResult};
use crate::presenter::{error_response, prefers_json, render_result};
use crate::state::AppState;

/// Multipart field carrying the image.
pub const UPLOAD_FIELD: &str = "file";

/// POST /upload - run detection on one uploaded image.
///
/// Responds with the result page, or the prediction array when the client
/// prefers JSON.
pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let wants_json = prefers_json(&headers);
    let production = state.config.is_production();

    let (filename, bytes) = match read_upload(multipart, state.config.max_upload_bytes).await {
        Ok(upload) => upload,
        Err(e) => return error_response(e, wants_json, production, None),
    };
    info!(filename = %filename, bytes = bytes.len(), "Received upload");

    let stored = match state.pipeline.accept(&filename, bytes).await {
        Ok(stored) => stored,
        Err(e) => return error_response(e, wants_json, production, None),
    };

    match state.pipeline.detect(&stored).await {
        Ok(outcome) if wants_json => Json(outcome.result).into_response(),
        Ok(outcome) => render_result(&outcome).into_response(),
        Err(e) => {
            let uploaded = format!("/uploads/{}", stored.storage_key);
            error_response(e, wants_json, production, Some(&uploaded))
        }
    }
}

/// Pull the client filename and bytes of the `file` field out of the form.
///
/// A part without a filename yields an empty name, which validation rejects.
async fn read_upload(
    multipart: Result<Multipart, MultipartRejection>,
    max_upload_bytes: usize,
) -> ApiResult<(String, Vec<u8>)> {
    let mut multipart = multipart.map_err(|e| ApiError::bad_request(format!("Invalid multipart request: {}", e)))?;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            debug!(field = ?field.name(), "Skipping multipart field");
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;

        if bytes.len() > max_upload_bytes {
            return Err(ApiError::payload_too_large(format!(
                "Upload is {} bytes, limit is {} bytes",
                bytes.len(),
                max_upload_bytes
            )));
        }

        return Ok((filename, bytes.to_vec()));
    }

    Err(ApiError::bad_request(format!("Missing multipart field '{}'", UPLOAD_FIELD)))
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large(e.body_text())
    } else {
        ApiError::bad_request(format!("Multipart error: {}", e.body_text()))
    }
}
