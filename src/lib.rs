//! # skytoast
//!
//! Converts equirectangular all-sky images into TOAST tile pyramids for
//! WorldWide Telescope and publishes them with their WTML manifests.
//!
//! # Architecture: Toast, Then Publish
//!
//! Every configured input goes through the same steps, one image at a time:
//!
//! ```text
//! 1. Load       Foo_equirectangular.tif  →  RGBA pixels + depth
//! 2. Tile       pixels                   →  Foo_toast/<level>/<y>/<y>_<x>.png
//! 3. Describe   pyramid                  →  Foo_toast/index_rel.wtml, thumb.jpg
//! 4. Rewrite    index_rel.wtml           →  Foo_toast/index.wtml  (absolute URLs)
//! ```
//!
//! Once every image has been toasted, each `Foo_toast/` directory is moved
//! into the public directory, replacing the previous publish.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | `skytoast.toml` loading, validation, and merging onto stock defaults |
//! | [`naming`] | Dataset, directory, and base-URL names derived from input file names |
//! | [`imaging`] | Source loading, depth estimation, sky sampling, tile encoding |
//! | [`toast`] | TOAST geometry and the pyramid builder |
//! | [`wtml`] | WTML manifest writing and URL rewriting |
//! | [`rewrite`] | Builtin and external-command manifest rewriters |
//! | [`publish`] | Rename-swap publishing into the public directory |
//! | [`pipeline`] | Per-image orchestration, events, and the run report |
//! | [`output`] | CLI output formatting |
//! | [`logging`] | `tracing` subscriber setup |
//!
//! # Design Decisions
//!
//! ## Native Tiling
//!
//! The pyramid is built in-process: the base level is sampled straight from
//! the source with the TOAST subdivision, coarser levels are averaged from
//! their children. No Python toolchain is needed at build time. The builder
//! sits behind [`toast::PyramidBackend`] so the pipeline can be tested with a
//! mock that writes a single tile.
//!
//! ## Checked Rewriting
//!
//! An external rewriter (`wwtdatatool`) can still be configured, but its exit
//! status is checked and every URL in the resulting manifest must start
//! with the image's base URL. A manifest that would break in the viewer
//! fails the build.
//!
//! ## Swap, Don't Delete
//!
//! Publishing never deletes the live directory before its replacement is in
//! place. See [`publish`].

pub mod config;
pub mod imaging;
pub mod logging;
pub mod naming;
pub mod output;
pub mod pipeline;
pub mod publish;
pub mod rewrite;
pub mod toast;
pub mod wtml;

#[cfg(test)]
pub(crate) mod test_helpers;
