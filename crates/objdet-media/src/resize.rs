//! Adaptive resize of stored uploads.

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{GenericImageView, ImageFormat};
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Longest side allowed before an upload is downscaled.
pub const DEFAULT_MAX_DIMENSION: u32 = 640;

/// What `adaptive_resize` did to the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeOutcome {
    /// Already within bounds; file untouched
    Unchanged { width: u32, height: u32 },
    /// Downscaled and overwritten in place
    Resized { from: (u32, u32), to: (u32, u32) },
}

impl ResizeOutcome {
    pub fn resized(&self) -> bool {
        matches!(self, Self::Resized { .. })
    }

    /// Final `(width, height)` of the stored image.
    pub fn dimensions(&self) -> (u32, u32) {
        match *self {
            Self::Unchanged { width, height } => (width, height),
            Self::Resized { to, .. } => to,
        }
    }
}

/// Target size for fitting `width`x`height` inside a `max_dimension` square.
///
/// `None` means the image already fits (or `max_dimension` is 0, which
/// disables resizing). New sides are truncated, never rounded up, and never
/// drop below one pixel.
pub fn fit_within(width: u32, height: u32, max_dimension: u32) -> Option<(u32, u32)> {
    if width == 0 || height == 0 || max_dimension == 0 {
        return None;
    }

    let max = f64::from(max_dimension);
    let ratio = (max / f64::from(height)).min(max / f64::from(width));
    if ratio >= 1.0 {
        return None;
    }

    let new_width = ((ratio * f64::from(width)).floor() as u32).max(1);
    let new_height = ((ratio * f64::from(height)).floor() as u32).max(1);
    Some((new_width, new_height))
}

/// Downscale the image at `path` in place so neither side exceeds `max_dimension`.
///
/// Idempotent: once an image fits, further calls leave it alone. The file
/// keeps its format; the new pixels are written to a sibling temp file and
/// renamed over the original.
pub async fn adaptive_resize(path: impl AsRef<Path>, max_dimension: u32) -> MediaResult<ResizeOutcome> {
    let path = path.as_ref().to_path_buf();
    tokio::task::spawn_blocking(move || resize_blocking(&path, max_dimension))
        .await
        .map_err(|e| MediaError::internal(format!("resize task failed: {}", e)))?
}

fn resize_blocking(path: &Path, max_dimension: u32) -> MediaResult<ResizeOutcome> {
    let reader = image::io::Reader::open(path)?.with_guessed_format()?;
    let format = reader
        .format()
        .or_else(|| ImageFormat::from_path(path).ok())
        .ok_or_else(|| MediaError::preprocess(format!("unknown image format: {}", path.display())))?;
    let img = reader.decode()?;
    let (width, height) = img.dimensions();

    let Some((new_width, new_height)) = fit_within(width, height, max_dimension) else {
        return Ok(ResizeOutcome::Unchanged { width, height });
    };

    let resized = img.resize_exact(new_width, new_height, FilterType::Triangle);

    let tmp_path = temp_sibling(path);
    if let Err(e) = resized.save_with_format(&tmp_path, format) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    std::fs::rename(&tmp_path, path)?;

    debug!(
        path = %path.display(),
        from = ?(width, height),
        to = ?(new_width, new_height),
        "Resized upload"
    );

    Ok(ResizeOutcome::Resized {
        from: (width, height),
        to: (new_width, new_height),
    })
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.resize", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use tempfile::TempDir;

    fn write_image(dir: &TempDir, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.path().join(name);
        RgbImage::from_pixel(width, height, image::Rgb([200, 40, 90]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn test_fit_within() {
        assert_eq!(fit_within(1280, 720, 640), Some((640, 360)));
        assert_eq!(fit_within(2000, 1000, 500), Some((500, 250)));
        assert_eq!(fit_within(1000, 2000, 500), Some((250, 500)));
        assert_eq!(fit_within(640, 480, 640), None);
        assert_eq!(fit_within(100, 100, 640), None);
        assert_eq!(fit_within(10_000, 1, 100), Some((100, 1)));
        assert_eq!(fit_within(0, 100, 640), None);
        assert_eq!(fit_within(1280, 720, 0), None);
    }

    #[test]
    fn test_fit_within_truncates() {
        // ratio = 640 / 1000 = 0.64; 0.64 * 999 = 639.36
        assert_eq!(fit_within(999, 1000, 640).map(|(w, _)| w), Some(639));
    }

    #[test]
    fn test_fit_within_is_idempotent_and_never_grows() {
        for &(w, h) in &[(1921, 1081), (3000, 17), (641, 641), (5, 4000), (777, 640)] {
            let Some((nw, nh)) = fit_within(w, h, 640) else {
                panic!("{}x{} should shrink", w, h);
            };
            assert!(nw <= w && nh <= h);
            assert!(nw <= 640 && nh <= 640);
            assert_eq!(fit_within(nw, nh, 640), None);
        }
    }

    #[tokio::test]
    async fn test_resize_large_png() {
        let dir = TempDir::new().unwrap();
        let path = write_image(&dir, "big.png", 1280, 720);

        let outcome = adaptive_resize(&path, 640).await.unwrap();
        assert!(outcome.resized());
        assert_eq!(outcome.dimensions(), (640, 360));
        assert_eq!(image::image_dimensions(&path).unwrap(), (640, 360));
    }

    #[tokio::test]
    async fn test_resize_keeps_jpeg_format() {
        let dir = TempDir::new().unwrap();
        let path = write_image(&dir, "photo.jpg", 2000, 1000);

        adaptive_resize(&path, 500).await.unwrap();

        let reader = image::io::Reader::open(&path).unwrap().with_guessed_format().unwrap();
        assert_eq!(reader.format(), Some(ImageFormat::Jpeg));
        assert_eq!(image::image_dimensions(&path).unwrap(), (500, 250));
    }

    #[tokio::test]
    async fn test_small_image_untouched() {
        let dir = TempDir::new().unwrap();
        let path = write_image(&dir, "small.bmp", 320, 200);
        let before = std::fs::read(&path).unwrap();

        let outcome = adaptive_resize(&path, 640).await.unwrap();
        assert_eq!(outcome, ResizeOutcome::Unchanged { width: 320, height: 200 });
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn test_resize_twice_matches_once() {
        let dir = TempDir::new().unwrap();
        let path = write_image(&dir, "twice.png", 1500, 900);

        let first = adaptive_resize(&path, 640).await.unwrap();
        let second = adaptive_resize(&path, 640).await.unwrap();

        assert!(first.resized());
        assert!(!second.resized());
        assert_eq!(first.dimensions(), second.dimensions());
    }

    #[tokio::test]
    async fn test_garbage_file_fails_without_touching_it() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fake.png");
        std::fs::write(&path, b"definitely not an image").unwrap();

        assert!(adaptive_resize(&path, 640).await.is_err());
        assert_eq!(std::fs::read(&path).unwrap(), b"definitely not an image");
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = adaptive_resize(dir.path().join("none.png"), 640).await.unwrap_err();
        assert!(matches!(err, MediaError::Io(_)));
    }
}
