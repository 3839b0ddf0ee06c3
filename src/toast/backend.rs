//! Pyramid builder trait and shared types.
//!
//! The [`PyramidBackend`] trait is the seam between the pipeline and the
//! tiling math: given a [`Sampler`] and a depth, a backend fills a
//! [`PyramidIo`] with every tile from the leaves up to the root.
//!
//! The production implementation is
//! [`ToastBuilder`](super::builder::ToastBuilder). Tests substitute a mock so
//! pipeline behaviour can be checked without rendering real pyramids.

use super::pyramid::PyramidIo;
use crate::imaging::{ImagingError, Sampler};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Tile I/O failed: {0}")]
    Imaging(#[from] ImagingError),
    #[error("Tile size must be a power of two of at least 2, got {0}")]
    InvalidTileSize(u32),
    #[error("Tiling failed: {0}")]
    Failed(String),
}

/// Summary of a built pyramid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TileSet {
    pub depth: u32,
    pub tile_size: u32,
    /// Tiles written per level, indexed by level.
    pub tiles_per_level: Vec<u64>,
}

impl TileSet {
    pub fn total_tiles(&self) -> u64 {
        self.tiles_per_level.iter().sum()
    }
}

/// Trait for pyramid builders.
///
/// `on_level` is called from the calling thread once per finished level,
/// leaves first, with the level and the number of tiles written.
pub trait PyramidBackend: Sync {
    fn build(
        &self,
        sampler: &dyn Sampler,
        depth: u32,
        io: &PyramidIo,
        on_level: &mut dyn FnMut(u32, u64),
    ) -> Result<TileSet, BuildError>;
}
