//! TOAST pyramid construction.
//!
//! - **Geometry**: tile positions and the TOAST subdivision of the sphere
//! - **Pyramid**: on-disk tile layout and URL template
//! - **Backend**: [`PyramidBackend`] trait, the seam the pipeline builds through
//! - **Builder**: [`ToastBuilder`], the native base-layer + cascade implementation

pub mod backend;
pub mod builder;
pub mod geometry;
pub mod pyramid;

pub use backend::{BuildError, PyramidBackend, TileSet};
pub use builder::ToastBuilder;
pub use geometry::{Tile, TilePos};
pub use pyramid::PyramidIo;
