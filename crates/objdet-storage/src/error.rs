//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while validating or storing uploads.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("Upload is empty")]
    EmptyUpload,

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn unsupported_media_type(filename: impl Into<String>) -> Self {
        Self::UnsupportedMediaType(filename.into())
    }

    pub fn invalid_filename(msg: impl Into<String>) -> Self {
        Self::InvalidFilename(msg.into())
    }

    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }
}
