//! Local upload store.

use std::path::{Path, PathBuf};

use objdet_models::{StoredImage, UploadedImage};
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};

/// Persists validated uploads into a single directory.
///
/// Every upload gets a fresh `<uuid>-<sanitized>` key, so concurrent requests
/// that send the same filename never write to the same path.
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the upload directory if it is missing.
    pub async fn ensure_dirs(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Generate a unique storage key for a sanitized filename.
    pub fn storage_key(sanitized_filename: &str) -> String {
        format!("{}-{}", Uuid::new_v4().simple(), sanitized_filename)
    }

    /// Write the upload to disk.
    ///
    /// Bytes go to a hidden temp file first and are renamed into place, so a
    /// reader never sees a partially written image.
    pub async fn persist(&self, upload: &UploadedImage) -> StorageResult<StoredImage> {
        let storage_key = Self::storage_key(&upload.sanitized_filename);
        let path = self.root.join(&storage_key);
        let tmp_path = self.root.join(format!(".{}.part", storage_key));

        fs::write(&tmp_path, &upload.raw_bytes).await?;
        if let Err(e) = fs::rename(&tmp_path, &path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(e));
        }

        let stem = match storage_key.rsplit_once('.') {
            Some((stem, _)) => stem.to_string(),
            None => storage_key.clone(),
        };

        info!(
            key = %storage_key,
            original = %upload.original_filename,
            bytes = upload.len(),
            "Stored upload"
        );

        Ok(StoredImage {
            path,
            storage_key,
            stem,
            width: None,
            height: None,
        })
    }
}

/// Resolve `name` inside `root`, refusing anything that would escape it.
///
/// `name` must be a single plain path component. The joined path is
/// canonicalized and checked against the canonical root, which also catches
/// symlinks pointing outside.
pub async fn resolve_within(root: &Path, name: &str) -> StorageResult<PathBuf> {
    if name.is_empty()
        || name.starts_with('.')
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        debug!(name = %name, "Refused file lookup");
        return Err(StorageError::invalid_filename(name));
    }

    let root = fs::canonicalize(root)
        .await
        .map_err(|_| StorageError::not_found(name))?;
    let candidate = fs::canonicalize(root.join(name))
        .await
        .map_err(|_| StorageError::not_found(name))?;

    if !candidate.starts_with(&root) {
        debug!(name = %name, "File lookup escaped its root");
        return Err(StorageError::not_found(name));
    }

    let meta = fs::metadata(&candidate).await?;
    if !meta.is_file() {
        return Err(StorageError::not_found(name));
    }

    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::UploadValidator;
    use tempfile::TempDir;

    fn upload(name: &str, bytes: &[u8]) -> UploadedImage {
        UploadValidator::default().validate(name, bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_persist_writes_bytes() {
        let dir = TempDir::new().unwrap();
        let store = UploadStore::new(dir.path());

        let stored = store.persist(&upload("dog.jpg", b"jpeg bytes")).await.unwrap();

        assert!(stored.storage_key.ends_with("-dog.jpg"));
        assert!(stored.stem.ends_with("-dog"));
        assert_eq!(stored.path, dir.path().join(&stored.storage_key));
        assert_eq!(fs::read(&stored.path).await.unwrap(), b"jpeg bytes");
        assert_eq!(stored.dimensions(), None);
    }

    #[tokio::test]
    async fn test_persist_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let store = UploadStore::new(dir.path());
        store.persist(&upload("dog.png", b"x")).await.unwrap();

        let mut entries = fs::read_dir(dir.path()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names.len(), 1);
        assert!(!names[0].starts_with('.'));
    }

    #[tokio::test]
    async fn test_persist_missing_directory_is_io_error() {
        let dir = TempDir::new().unwrap();
        let store = UploadStore::new(dir.path().join("missing"));
        let err = store.persist(&upload("dog.png", b"x")).await.unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));

        store.ensure_dirs().await.unwrap();
        assert!(store.persist(&upload("dog.png", b"x")).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_uploads_with_same_name_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let store = UploadStore::new(dir.path());

        let mut handles = Vec::new();
        for i in 0..16u8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let bytes = vec![i; 4096];
                let stored = store.persist(&upload("same.png", &bytes)).await.unwrap();
                (stored, bytes)
            }));
        }

        let mut paths = std::collections::HashSet::new();
        for handle in handles {
            let (stored, bytes) = handle.await.unwrap();
            assert_eq!(fs::read(&stored.path).await.unwrap(), bytes);
            assert!(paths.insert(stored.path));
        }
        assert_eq!(paths.len(), 16);
    }

    #[tokio::test]
    async fn test_resolve_within() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("uploads");
        fs::create_dir_all(&root).await.unwrap();
        fs::write(root.join("dog.jpg"), b"x").await.unwrap();
        fs::write(dir.path().join("secret.txt"), b"s").await.unwrap();
        fs::create_dir_all(root.join("sub")).await.unwrap();

        let resolved = resolve_within(&root, "dog.jpg").await.unwrap();
        assert!(resolved.ends_with("dog.jpg"));

        for bad in ["", "..", "../secret.txt", ".hidden", "a/b", "a\\b", "nul\0.jpg"] {
            assert!(
                matches!(resolve_within(&root, bad).await, Err(StorageError::InvalidFilename(_))),
                "{:?} should be refused",
                bad
            );
        }

        assert!(matches!(
            resolve_within(&root, "missing.jpg").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            resolve_within(&root, "sub").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_resolve_within_rejects_escaping_symlink() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("uploads");
        fs::create_dir_all(&root).await.unwrap();
        fs::write(dir.path().join("secret.txt"), b"s").await.unwrap();
        std::os::unix::fs::symlink(dir.path().join("secret.txt"), root.join("link.txt")).unwrap();

        assert!(matches!(
            resolve_within(&root, "link.txt").await,
            Err(StorageError::NotFound(_))
        ));
    }
}
