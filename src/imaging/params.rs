//! Encoding parameter types.
//!
//! - [`TileFormat`]: on-disk encoding of pyramid tiles (PNG or JPEG)
//! - [`Quality`]: lossy encoding quality (1-100, default 90), clamped on construction

use serde::{Deserialize, Serialize};

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// Quality as the `u8` the `image` JPEG encoder expects.
    pub fn as_u8(self) -> u8 {
        self.0.clamp(1, 100) as u8
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Encoding used for pyramid tiles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileFormat {
    /// Lossless with alpha; the default.
    #[default]
    Png,
    /// Smaller, no alpha. Transparent regions come out black.
    Jpeg,
}

impl TileFormat {
    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            TileFormat::Png => "png",
            TileFormat::Jpeg => "jpg",
        }
    }

    /// Value of the WTML `FileType` attribute.
    pub fn wtml_file_type(self) -> String {
        format!(".{}", self.extension())
    }
}
