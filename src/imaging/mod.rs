//! Image handling in pure Rust.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode source** | `image::ImageReader` (TIFF, PNG, JPEG, WebP) → RGBA8 |
//! | **Sample** | [`PlateCarreeSampler`], nearest pixel, galactic or equatorial frame |
//! | **Cascade** | 2×2 mean downsample of four child tiles |
//! | **Encode tiles** | PNG or JPEG via `image` |
//! | **Thumbnail** | Lanczos3 fill-resize, center crop → JPEG |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for depth and tile-count math (unit testable)
//! - **Parameters**: Tile format and encoding quality
//! - **Source**: Loading the equirectangular source image
//! - **Sampler**: [`Sampler`] trait + plate carrée implementation
//! - **Operations**: Pixel operations and tile/thumbnail encoding

mod calculations;
pub mod operations;
mod params;
pub mod sampler;
pub mod source;

pub use calculations::{tiles_at_level, toast_depth, total_tiles};
pub use operations::{decode_tile, downsample_2x2, encode_tile, write_thumbnail};
pub use params::{Quality, TileFormat};
pub use sampler::{Frame, PlateCarreeSampler, Sampler};
pub use source::SourceImage;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImagingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to decode {path}: {message}")]
    Decode {
        path: std::path::PathBuf,
        message: String,
    },
    #[error("Failed to encode {path}: {message}")]
    Encode {
        path: std::path::PathBuf,
        message: String,
    },
}
