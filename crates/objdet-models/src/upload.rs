//! Upload models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// An upload that passed validation.
///
/// Built by the storage crate's validator; `extension` is always lower-cased
/// and a member of the configured allow-list.
#[derive(Clone)]
pub struct UploadedImage {
    pub raw_bytes: Vec<u8>,
    /// Filename as sent by the client
    pub original_filename: String,
    /// Filename safe to use on disk
    pub sanitized_filename: String,
    pub extension: String,
}

impl UploadedImage {
    pub fn len(&self) -> usize {
        self.raw_bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw_bytes.is_empty()
    }
}

impl fmt::Debug for UploadedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedImage")
            .field("original_filename", &self.original_filename)
            .field("sanitized_filename", &self.sanitized_filename)
            .field("extension", &self.extension)
            .field("bytes", &self.raw_bytes.len())
            .finish()
    }
}

/// An upload persisted in the upload directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StoredImage {
    /// Full path of the stored file
    pub path: PathBuf,
    /// File name inside the upload directory, unique per request
    pub storage_key: String,
    /// Storage key without its extension
    pub stem: String,
    /// Width in pixels, known once the image has been preprocessed
    pub width: Option<u32>,
    /// Height in pixels, known once the image has been preprocessed
    pub height: Option<u32>,
}

impl StoredImage {
    pub fn set_dimensions(&mut self, width: u32, height: u32) {
        self.width = Some(width);
        self.height = Some(height);
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        Some((self.width?, self.height?))
    }
}
