//! Shared test utilities for the picserve test suite.
//!
//! Provides synthetic image fixtures so tests never depend on binary files
//! checked into the repo.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = source_dir(&[("a.jpg", 200, 100), ("sub/b.png", 50, 50)]);
//! let store = DiskStore::open(tmp.path(), Arc::new(RustTransformer::new())).unwrap();
//! assert_eq!(dims(&store.get("a.jpg").unwrap()), (200, 100));
//! ```

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::path::Path;
use tempfile::TempDir;

// =========================================================================
// Synthetic images
// =========================================================================

/// An RGB gradient, so resizes and crops produce distinguishable pixels.
pub fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    }))
}

pub fn dims(image: &DynamicImage) -> (u32, u32) {
    (image.width(), image.height())
}

/// Write a gradient JPEG to `path`.
pub fn create_test_jpeg(path: &Path, width: u32, height: u32) {
    gradient(width, height)
        .save_with_format(path, ImageFormat::Jpeg)
        .unwrap();
}

/// Write a gradient PNG to `path`.
pub fn create_test_png(path: &Path, width: u32, height: u32) {
    gradient(width, height)
        .save_with_format(path, ImageFormat::Png)
        .unwrap();
}

// =========================================================================
// Fixture directories
// =========================================================================

/// A temp directory holding one synthetic image per `(key, width, height)`.
///
/// The format follows the key's extension; parent directories are created.
pub fn source_dir(images: &[(&str, u32, u32)]) -> TempDir {
    let tmp = TempDir::new().unwrap();
    for &(key, width, height) in images {
        let path = tmp.path().join(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let is_png = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
        if is_png {
            create_test_png(&path, width, height);
        } else {
            create_test_jpeg(&path, width, height);
        }
    }
    tmp
}
