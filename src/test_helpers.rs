//! Shared test utilities for the skytoast test suite.
//!
//! Synthetic source images, directory listings, and a config rooted in a
//! temp directory.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! write_test_tiff(&tmp.path().join("Test_equirectangular.tif"), 64, 32);
//! let config = test_config(tmp.path(), &["Test_equirectangular.tif"]);
//! ```

use crate::config::PipelineConfig;
use image::{Rgb, RgbImage};
use std::path::Path;
use walkdir::WalkDir;

// =========================================================================
// Synthetic images
// =========================================================================

/// Write an RGB8 TIFF with a horizontal/vertical gradient.
pub fn write_test_tiff(path: &Path, width: u32, height: u32) {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            128,
        ])
    });
    img.save_with_format(path, image::ImageFormat::Tiff).unwrap();
}

// =========================================================================
// Filesystem
// =========================================================================

/// Every file under `dir` as a sorted list of `/`-separated relative paths.
pub fn list_files(dir: &Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(dir)
                .unwrap()
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/")
        })
        .collect();
    files.sort();
    files
}

// =========================================================================
// Config
// =========================================================================

/// Stock config with inputs, work and public dirs inside `root`.
///
/// Thumbnails stay enabled. Work dir is `root/work`, public dir `root/public`.
pub fn test_config(root: &Path, inputs: &[&str]) -> PipelineConfig {
    PipelineConfig {
        inputs: inputs
            .iter()
            .map(|i| root.join(i).to_string_lossy().into_owned())
            .collect(),
        work_dir: root.join("work").to_string_lossy().into_owned(),
        public_dir: root.join("public").to_string_lossy().into_owned(),
        ..PipelineConfig::default()
    }
}
