//! Pipeline configuration module.
//!
//! Handles loading, validating, and merging `skytoast.toml`. Every knob the
//! pipeline uses (tile edge, inputs, publish path, naming suffixes) lives here
//! with a documented default, so a missing config file reproduces the stock
//! SPHEREx batch.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! inputs = ["SPHEREx_LinesRB_equirectangular.tif", "SPHEREx_StarsRGB_equirectangular.tif"]
//! work_dir = "."              # Where <name>_toast/ directories are built
//! public_dir = "../../public" # Where finished pyramids are published
//!
//! [naming]
//! suffix = "_toast"                 # Appended to the output directory name
//! strip_suffix = "_equirectangular" # Removed from the file stem first ("" keeps old URLs)
//! url_prefix = "/"                  # Base URL = url_prefix + dir name + "/"
//!
//! [tiles]
//! size = 256                # Tile edge in pixels (power of two)
//! format = "png"            # png | jpeg
//! quality = 90              # JPEG tiles and thumbnail (1-100)
//!
//! [sampler]
//! frame = "galactic"        # Frame of the source image: galactic | equatorial
//!
//! [thumbnail]
//! enabled = true
//! width = 96
//! height = 45
//!
//! [rewrite]
//! command = "wwtdatatool"   # External URL rewriter (omit for builtin)
//!
//! [processing]
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! Config files are sparse: override just the values you want. Unknown keys
//! are rejected to catch typos early.

use crate::imaging::{Frame, TileFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default config file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "skytoast.toml";

const MIN_TILE_SIZE: u32 = 2;
const MAX_TILE_SIZE: u32 = 4096;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Pipeline configuration loaded from `skytoast.toml`.
///
/// All fields have defaults. User config files need only specify the values
/// they want to override.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Source images, processed in order.
    pub inputs: Vec<String>,
    /// Directory the `<name>_toast/` output directories are built in.
    pub work_dir: String,
    /// Directory finished pyramids are moved into.
    pub public_dir: String,
    /// Output directory and URL naming.
    pub naming: NamingConfig,
    /// Tile edge and encoding.
    pub tiles: TilesConfig,
    /// How TOAST coordinates map onto source pixels.
    pub sampler: SamplerConfig,
    /// Manifest thumbnail generation.
    pub thumbnail: ThumbnailConfig,
    /// Manifest URL rewriting.
    pub rewrite: RewriteConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inputs: vec![
                "SPHEREx_LinesRB_equirectangular.tif".to_string(),
                "SPHEREx_StarsRGB_equirectangular.tif".to_string(),
            ],
            work_dir: ".".to_string(),
            public_dir: "../../public".to_string(),
            naming: NamingConfig::default(),
            tiles: TilesConfig::default(),
            sampler: SamplerConfig::default(),
            thumbnail: ThumbnailConfig::default(),
            rewrite: RewriteConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.inputs.is_empty() {
            return Err(ConfigError::Validation("inputs must not be empty".into()));
        }
        let size = self.tiles.size;
        if !size.is_power_of_two() || !(MIN_TILE_SIZE..=MAX_TILE_SIZE).contains(&size) {
            return Err(ConfigError::Validation(format!(
                "tiles.size must be a power of two between {MIN_TILE_SIZE} and {MAX_TILE_SIZE}, got {size}"
            )));
        }
        if !(1..=100).contains(&self.tiles.quality) {
            return Err(ConfigError::Validation(format!(
                "tiles.quality must be between 1 and 100, got {}",
                self.tiles.quality
            )));
        }
        if self.naming.suffix.is_empty() {
            return Err(ConfigError::Validation(
                "naming.suffix must not be empty".into(),
            ));
        }
        let prefix = &self.naming.url_prefix;
        if !prefix.starts_with('/') || !prefix.ends_with('/') {
            return Err(ConfigError::Validation(
                "naming.url_prefix must start and end with '/'".into(),
            ));
        }
        if self.thumbnail.enabled && (self.thumbnail.width == 0 || self.thumbnail.height == 0) {
            return Err(ConfigError::Validation(
                "thumbnail.width and thumbnail.height must be non-zero".into(),
            ));
        }
        if self
            .rewrite
            .command
            .as_deref()
            .is_some_and(|c| c.trim().is_empty())
        {
            return Err(ConfigError::Validation(
                "rewrite.command must not be blank".into(),
            ));
        }
        Ok(())
    }

    pub fn input_paths(&self) -> Vec<PathBuf> {
        self.inputs.iter().map(PathBuf::from).collect()
    }

    pub fn work_dir(&self) -> &Path {
        Path::new(&self.work_dir)
    }

    pub fn public_dir(&self) -> &Path {
        Path::new(&self.public_dir)
    }
}

/// Output directory and URL naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NamingConfig {
    /// Appended to the (stripped) file stem to form the output directory name.
    pub suffix: String,
    /// Removed from the end of the file stem before the suffix is appended.
    pub strip_suffix: String,
    /// Prefix of the absolute base URL, e.g. `/` or `/skymaps/`.
    pub url_prefix: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            suffix: "_toast".to_string(),
            strip_suffix: "_equirectangular".to_string(),
            url_prefix: "/".to_string(),
        }
    }
}

/// Tile edge and encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TilesConfig {
    /// Tile edge in pixels. Must be a power of two.
    pub size: u32,
    pub format: TileFormat,
    /// JPEG quality for tiles and the thumbnail (1-100).
    pub quality: u32,
}

impl Default for TilesConfig {
    fn default() -> Self {
        Self {
            size: 256,
            format: TileFormat::Png,
            quality: 90,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SamplerConfig {
    /// Coordinate frame the equirectangular source image is laid out in.
    pub frame: Frame,
}

/// Manifest thumbnail settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThumbnailConfig {
    pub enabled: bool,
    pub width: u32,
    pub height: u32,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            width: 96,
            height: 45,
        }
    }
}

/// Manifest URL rewriting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RewriteConfig {
    /// External rewriter invoked as `<command> wtml rewrite-urls <in> <base> <out>`.
    /// When absent the builtin rewriter is used.
    pub command: Option<String>,
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel tile workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the base layer user overrides are merged onto.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(PipelineConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<PipelineConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: PipelineConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from the given file, falling back to stock defaults when the
/// file does not exist.
pub fn load_config(path: &Path) -> Result<PipelineConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `skytoast.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# skytoast configuration
# ======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys cause an error.

# Equirectangular source images, processed in order.
inputs = ["SPHEREx_LinesRB_equirectangular.tif", "SPHEREx_StarsRGB_equirectangular.tif"]

# Directory the <name>_toast/ output directories are built in.
work_dir = "."

# Directory finished pyramids are moved into. An existing pyramid with the
# same name is replaced entirely.
public_dir = "../../public"

# ---------------------------------------------------------------------------
# Naming
# ---------------------------------------------------------------------------
[naming]
# Appended to the file stem to form the output directory name.
suffix = "_toast"

# Removed from the end of the file stem first, so that
# Foo_equirectangular.tif becomes Foo_toast/. Set to "" to keep the stem.
#
# This changes published URLs: SPHEREx_LinesRB_equirectangular.tif is
# published as SPHEREx_LinesRB_toast/ rather than
# SPHEREx_LinesRB_equirectangular_toast/. Use strip_suffix = "" to keep
# serving the old directory names and URLs.
strip_suffix = "_equirectangular"

# Manifest URLs are rewritten to <url_prefix><dir name>/...
url_prefix = "/"

# ---------------------------------------------------------------------------
# Tiles
# ---------------------------------------------------------------------------
[tiles]
# Tile edge in pixels (power of two). Depth is the smallest level at which
# size * 2^depth covers the longer edge of the source image.
size = 256

# Tile encoding: "png" (keeps transparency) or "jpeg".
format = "png"

# JPEG quality (1-100), used for jpeg tiles and thumb.jpg.
quality = 90

# ---------------------------------------------------------------------------
# Sampling
# ---------------------------------------------------------------------------
[sampler]
# Coordinate frame of the source image: "galactic" or "equatorial".
frame = "galactic"

# ---------------------------------------------------------------------------
# Thumbnail referenced by the manifest
# ---------------------------------------------------------------------------
[thumbnail]
enabled = true
width = 96
height = 45

# ---------------------------------------------------------------------------
# Manifest URL rewriting
# ---------------------------------------------------------------------------
[rewrite]
# External tool invoked as: <command> wtml rewrite-urls <in> <base> <out>
# Omit to use the builtin rewriter.
# command = "wwtdatatool"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel tile workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
