//! Upload validation.
//!
//! An upload is accepted when the text after the last `.` of the client
//! filename is in the allow-list (compared as sent and lower-cased), the
//! payload is not empty, and the filename still carries that extension after
//! sanitization.

use std::collections::HashSet;

use objdet_models::UploadedImage;
use tracing::debug;

use crate::error::{StorageError, StorageResult};

/// Extensions accepted when nothing else is configured.
pub const DEFAULT_ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Validates client uploads against an extension allow-list.
#[derive(Debug, Clone)]
pub struct UploadValidator {
    allowed: HashSet<String>,
}

impl Default for UploadValidator {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_EXTENSIONS)
    }
}

impl UploadValidator {
    /// Create a validator for the given extensions (without the leading dot).
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let allowed = allowed
            .into_iter()
            .map(Into::into)
            .map(|ext| ext.trim().trim_start_matches('.').to_string())
            .filter(|ext| !ext.is_empty())
            .collect();
        Self { allowed }
    }

    /// Allowed extensions, sorted.
    pub fn allowed_extensions(&self) -> Vec<&str> {
        let mut exts: Vec<&str> = self.allowed.iter().map(String::as_str).collect();
        exts.sort_unstable();
        exts
    }

    /// Whether the filename carries an allowed extension.
    pub fn is_allowed(&self, filename: &str) -> bool {
        match filename.rsplit_once('.') {
            Some((_, ext)) => {
                self.allowed.contains(ext) || self.allowed.contains(&ext.to_lowercase())
            }
            None => false,
        }
    }

    /// Validate an upload and produce its sanitized form.
    pub fn validate(&self, filename: &str, bytes: impl Into<Vec<u8>>) -> StorageResult<UploadedImage> {
        if !self.is_allowed(filename) {
            debug!(filename = %filename, "Rejected upload extension");
            return Err(StorageError::unsupported_media_type(filename));
        }

        let raw_bytes = bytes.into();
        if raw_bytes.is_empty() {
            return Err(StorageError::EmptyUpload);
        }

        let sanitized = sanitize_filename(filename);
        let extension = match sanitized.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && self.is_allowed(&sanitized) => {
                ext.to_lowercase()
            }
            _ => {
                return Err(StorageError::invalid_filename(format!(
                    "'{}' has no usable name after sanitization",
                    filename
                )))
            }
        };

        Ok(UploadedImage {
            raw_bytes,
            original_filename: filename.to_string(),
            sanitized_filename: sanitized,
            extension,
        })
    }
}

/// Make a client filename safe to use as a single path component.
///
/// Path separators become word breaks, whitespace runs become `_`, non-ASCII
/// and anything outside `[A-Za-z0-9_.-]` is dropped, and leading or trailing
/// `.`/`_` are stripped. The result never contains a separator.
pub fn sanitize_filename(filename: &str) -> String {
    let spaced: String = filename
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");

    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();

    kept.trim_matches(|c| c == '.' || c == '_').to_string()
}
