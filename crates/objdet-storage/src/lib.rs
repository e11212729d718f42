//! Upload validation and local file storage.
//!
//! This crate provides:
//! - Extension allow-list checks and filename sanitization
//! - Persisting uploads under a unique per-request storage key
//! - Contained lookups of stored files for serving

pub mod error;
pub mod store;
pub mod validate;

pub use error::{StorageError, StorageResult};
pub use store::{resolve_within, UploadStore};
pub use validate::{sanitize_filename, UploadValidator, DEFAULT_ALLOWED_EXTENSIONS};
