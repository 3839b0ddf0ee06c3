//! On-disk pyramid layout.
//!
//! Tiles are stored as `<root>/<level>/<y>/<y>_<x>.<ext>`, which WWT addresses
//! with the URL template `{1}/{3}/{3}_{2}.<ext>` (`{1}` level, `{2}` x,
//! `{3}` y).
//!
//! ```text
//! Test_toast/
//! ├── 0/0/0_0.png
//! ├── 1/0/0_0.png
//! ├── 1/0/0_1.png
//! ├── 1/1/1_0.png
//! ├── 1/1/1_1.png
//! └── 2/...
//! ```

use super::geometry::TilePos;
use crate::imaging::{ImagingError, Quality, TileFormat, decode_tile, encode_tile};
use image::RgbaImage;
use std::path::{Path, PathBuf};

/// Reads and writes the tiles of one pyramid.
#[derive(Debug, Clone)]
pub struct PyramidIo {
    root: PathBuf,
    format: TileFormat,
    quality: Quality,
}

impl PyramidIo {
    pub fn new(root: impl Into<PathBuf>, format: TileFormat) -> Self {
        Self {
            root: root.into(),
            format,
            quality: Quality::default(),
        }
    }

    /// Quality for lossy tile formats.
    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn format(&self) -> TileFormat {
        self.format
    }

    /// Path of the tile at `pos`.
    pub fn tile_path(&self, pos: TilePos) -> PathBuf {
        self.root
            .join(pos.level.to_string())
            .join(pos.y.to_string())
            .join(format!("{}_{}.{}", pos.y, pos.x, self.format.extension()))
    }

    /// Relative URL template for manifests.
    pub fn url_template(&self) -> String {
        format!("{{1}}/{{3}}/{{3}}_{{2}}.{}", self.format.extension())
    }

    /// Write a tile, creating its directory as needed.
    pub fn write_tile(&self, pos: TilePos, tile: &RgbaImage) -> Result<(), ImagingError> {
        let path = self.tile_path(pos);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        encode_tile(tile, &path, self.format, self.quality)
    }

    /// Read a tile back. `Ok(None)` if it was never written.
    pub fn read_tile(&self, pos: TilePos) -> Result<Option<RgbaImage>, ImagingError> {
        decode_tile(&self.tile_path(pos))
    }
}
