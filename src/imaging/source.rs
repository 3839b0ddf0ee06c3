//! Source image loading.
//!
//! Sky maps arrive as 8- or 16-bit RGB(A) or grayscale TIFFs. Everything is
//! normalised to 8-bit RGBA on load so the sampler and tile encoders deal with
//! a single pixel type.

use super::ImagingError;
use image::{ImageReader, RgbaImage};
use std::path::Path;

/// A decoded equirectangular source image.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pixels: RgbaImage,
    channels: u8,
}

impl SourceImage {
    /// Decode an image file from disk.
    pub fn load(path: &Path) -> Result<Self, ImagingError> {
        let decoded = ImageReader::open(path)?
            .with_guessed_format()?
            .decode()
            .map_err(|e| ImagingError::Decode {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        let channels = decoded.color().channel_count();
        Ok(Self {
            pixels: decoded.into_rgba8(),
            channels,
        })
    }

    /// Wrap already-decoded pixels.
    pub fn from_rgba(pixels: RgbaImage) -> Self {
        Self {
            pixels,
            channels: 4,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Channel count of the file as stored, before RGBA normalisation.
    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// The longer of width and height; drives the depth estimate.
    pub fn longest_edge(&self) -> u32 {
        self.width().max(self.height())
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }
}
