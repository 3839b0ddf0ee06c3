//! Native TOAST pyramid builder.
//!
//! Building happens in two passes, mirroring how WWT pyramids are usually
//! produced:
//!
//! 1. **Base layer**: every tile at the requested depth is rendered by
//!    sampling the source at each pixel centre ([`ToastBuilder::toast_base`]).
//! 2. **Cascade**: each coarser tile is the 2×2 mean downsample of its four
//!    children, read back from disk, down to the root
//!    ([`ToastBuilder::cascade`]).
//!
//! Both passes run the tiles of one level in parallel on the rayon pool.
//! Reading children back from disk keeps memory flat no matter the depth.
//!
//! Depth 0 has no quadrilateral tile to sample, so the root is rendered from
//! the four level-1 quadrants at half resolution.

use super::backend::{BuildError, PyramidBackend, TileSet};
use super::geometry::{Tile, TilePos, level1_tiles};
use super::pyramid::PyramidIo;
use crate::imaging::{Sampler, downsample_2x2, tiles_at_level};
use image::RgbaImage;
use image::imageops;
use rayon::prelude::*;
use tracing::debug;

/// Renders TOAST pyramids with tiles of a fixed edge length.
#[derive(Debug, Clone, Copy)]
pub struct ToastBuilder {
    tile_size: u32,
}

impl ToastBuilder {
    pub fn new(tile_size: u32) -> Result<Self, BuildError> {
        if tile_size < 2 || !tile_size.is_power_of_two() {
            return Err(BuildError::InvalidTileSize(tile_size));
        }
        Ok(Self { tile_size })
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Sample one tile of geometry `tile` at `size × size` pixels.
    fn render_geometry(sampler: &dyn Sampler, tile: &Tile, size: u32) -> RgbaImage {
        let lonlats = tile.pixel_lonlats(size);
        RgbaImage::from_fn(size, size, |x, y| {
            let (lon, lat) = lonlats[(y * size + x) as usize];
            sampler.sample(lon, lat)
        })
    }

    /// Render the tile at `pos` directly from the sampler.
    pub fn render_tile(&self, sampler: &dyn Sampler, pos: TilePos) -> RgbaImage {
        match Tile::at(pos) {
            Some(tile) => Self::render_geometry(sampler, &tile, self.tile_size),
            None => {
                let half = self.tile_size / 2;
                let mut root = RgbaImage::new(self.tile_size, self.tile_size);
                for quadrant in level1_tiles() {
                    let img = Self::render_geometry(sampler, &quadrant, half);
                    imageops::replace(
                        &mut root,
                        &img,
                        i64::from(quadrant.pos.x * half),
                        i64::from(quadrant.pos.y * half),
                    );
                }
                root
            }
        }
    }

    /// Render and write every tile at `depth`. Returns the tile count.
    pub fn toast_base(
        &self,
        sampler: &dyn Sampler,
        depth: u32,
        io: &PyramidIo,
    ) -> Result<u64, BuildError> {
        let count = tiles_at_level(depth);
        debug!(depth, count, "rendering base layer");
        (0..count).into_par_iter().try_for_each(|index| {
            let pos = TilePos::from_index(depth, index);
            let tile = self.render_tile(sampler, pos);
            io.write_tile(pos, &tile).map_err(BuildError::from)
        })?;
        Ok(count)
    }

    /// Build the parent of four children already on disk.
    fn merge_children(&self, io: &PyramidIo, pos: TilePos) -> Result<RgbaImage, BuildError> {
        let size = self.tile_size;
        let mut canvas = RgbaImage::new(size * 2, size * 2);
        for (k, child) in pos.children().into_iter().enumerate() {
            if let Some(img) = io.read_tile(child)? {
                let (dx, dy) = ((k as u32 % 2) * size, (k as u32 / 2) * size);
                imageops::replace(&mut canvas, &img, i64::from(dx), i64::from(dy));
            }
        }
        Ok(downsample_2x2(&canvas))
    }

    /// Fill levels `depth - 1` down to 0 from the level below.
    pub fn cascade(
        &self,
        depth: u32,
        io: &PyramidIo,
        on_level: &mut dyn FnMut(u32, u64),
    ) -> Result<(), BuildError> {
        for level in (0..depth).rev() {
            let count = tiles_at_level(level);
            debug!(level, count, "cascading");
            (0..count).into_par_iter().try_for_each(|index| {
                let pos = TilePos::from_index(level, index);
                let tile = self.merge_children(io, pos)?;
                io.write_tile(pos, &tile).map_err(BuildError::from)
            })?;
            on_level(level, count);
        }
        Ok(())
    }
}

impl PyramidBackend for ToastBuilder {
    fn build(
        &self,
        sampler: &dyn Sampler,
        depth: u32,
        io: &PyramidIo,
        on_level: &mut dyn FnMut(u32, u64),
    ) -> Result<TileSet, BuildError> {
        std::fs::create_dir_all(io.root())?;
        let base = self.toast_base(sampler, depth, io)?;
        on_level(depth, base);
        self.cascade(depth, io, on_level)?;
        Ok(TileSet {
            depth,
            tile_size: self.tile_size,
            tiles_per_level: (0..=depth).map(tiles_at_level).collect(),
        })
    }
}
