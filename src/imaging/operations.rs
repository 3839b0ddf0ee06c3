//! Pixel operations and encoding.
//!
//! These functions do the pixel work for the pyramid builder (cascade and
//! tile I/O) and the manifest thumbnail. They know nothing about TOAST.

use super::ImagingError;
use super::params::{Quality, TileFormat};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Downsample by two with a 2×2 box filter.
///
/// Each output pixel is the rounded mean of one 2×2 block, per channel.
/// An odd last row or column is dropped.
pub fn downsample_2x2(src: &RgbaImage) -> RgbaImage {
    let (dst_w, dst_h) = (src.width() / 2, src.height() / 2);
    RgbaImage::from_fn(dst_w, dst_h, |x, y| {
        let (sx, sy) = (x * 2, y * 2);
        let block = [
            src.get_pixel(sx, sy),
            src.get_pixel(sx + 1, sy),
            src.get_pixel(sx, sy + 1),
            src.get_pixel(sx + 1, sy + 1),
        ];
        let mut out = [0u8; 4];
        for (c, value) in out.iter_mut().enumerate() {
            let sum: u32 = block.iter().map(|p| u32::from(p[c])).sum();
            *value = ((sum + 2) / 4) as u8;
        }
        image::Rgba(out)
    })
}

/// Encode a tile to disk in the given format.
///
/// JPEG drops the alpha channel.
pub fn encode_tile(
    tile: &RgbaImage,
    path: &Path,
    format: TileFormat,
    quality: Quality,
) -> Result<(), ImagingError> {
    let encode_err = |e: image::ImageError| ImagingError::Encode {
        path: path.to_path_buf(),
        message: e.to_string(),
    };
    match format {
        TileFormat::Png => tile
            .save_with_format(path, ImageFormat::Png)
            .map_err(encode_err),
        TileFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(tile.clone()).into_rgb8();
            save_jpeg(&DynamicImage::ImageRgb8(rgb), path, quality)
        }
    }
}

/// Decode a tile written by [`encode_tile`].
///
/// Returns `Ok(None)` when the file does not exist.
pub fn decode_tile(path: &Path) -> Result<Option<RgbaImage>, ImagingError> {
    if !path.exists() {
        return Ok(None);
    }
    let img = image::open(path).map_err(|e| ImagingError::Decode {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(Some(img.into_rgba8()))
}

/// Write a JPEG thumbnail: fill-resize then center-crop to exact dimensions.
pub fn write_thumbnail(
    source: &RgbaImage,
    path: &Path,
    width: u32,
    height: u32,
    quality: Quality,
) -> Result<(), ImagingError> {
    let (fill_w, fill_h) = fill_size(source.width(), source.height(), width, height);
    let resized = imageops::resize(source, fill_w, fill_h, FilterType::Lanczos3);
    let cropped = imageops::crop_imm(
        &resized,
        (fill_w - width) / 2,
        (fill_h - height) / 2,
        width,
        height,
    )
    .to_image();
    let rgb = DynamicImage::ImageRgba8(cropped).into_rgb8();
    save_jpeg(&DynamicImage::ImageRgb8(rgb), path, quality)
}

/// Smallest size with the source's aspect ratio that covers `width`×`height`.
fn fill_size(src_w: u32, src_h: u32, width: u32, height: u32) -> (u32, u32) {
    let ratio = (f64::from(width) / f64::from(src_w.max(1)))
        .max(f64::from(height) / f64::from(src_h.max(1)));
    let fill_w = ((f64::from(src_w) * ratio).round() as u32).max(width);
    let fill_h = ((f64::from(src_h) * ratio).round() as u32).max(height);
    (fill_w, fill_h)
}

fn save_jpeg(img: &DynamicImage, path: &Path, quality: Quality) -> Result<(), ImagingError> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    let encoder = JpegEncoder::new_with_quality(writer, quality.as_u8());
    img.write_with_encoder(encoder)
        .map_err(|e| ImagingError::Encode {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn downsample_averages_blocks() {
        let src = RgbaImage::from_fn(4, 2, |x, _| {
            if x < 2 {
                Rgba([100, 0, 0, 255])
            } else if x == 2 {
                Rgba([0, 0, 0, 0])
            } else {
                Rgba([0, 200, 0, 255])
            }
        });
        let dst = downsample_2x2(&src);
        assert_eq!(dst.dimensions(), (2, 1));
        assert_eq!(*dst.get_pixel(0, 0), Rgba([100, 0, 0, 255]));
        // Two transparent black + two opaque green: mean of each channel
        assert_eq!(*dst.get_pixel(1, 0), Rgba([0, 100, 0, 128]));
    }

    #[test]
    fn downsample_drops_odd_edge() {
        let src = RgbaImage::new(5, 3);
        assert_eq!(downsample_2x2(&src).dimensions(), (2, 1));
    }

    #[test]
    fn png_tile_roundtrips_exactly() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("tile.png");
        let tile = RgbaImage::from_fn(8, 8, |x, y| Rgba([x as u8 * 10, y as u8 * 10, 7, 200]));

        encode_tile(&tile, &path, TileFormat::Png, Quality::default()).unwrap();
        let decoded = decode_tile(&path).unwrap().unwrap();
        assert_eq!(decoded, tile);
    }

    #[test]
    fn jpeg_tile_is_opaque() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("tile.jpg");
        let tile = RgbaImage::from_pixel(16, 16, Rgba([10, 20, 30, 0]));

        encode_tile(&tile, &path, TileFormat::Jpeg, Quality::default()).unwrap();
        let decoded = decode_tile(&path).unwrap().unwrap();
        assert_eq!(decoded.dimensions(), (16, 16));
        assert_eq!(decoded.get_pixel(3, 3)[3], 255);
    }

    #[test]
    fn decode_missing_tile_is_none() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(decode_tile(&tmp.path().join("nope.png")).unwrap().is_none());
    }

    #[test]
    fn encode_into_missing_directory_errors() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("missing/tile.png");
        let tile = RgbaImage::new(2, 2);
        assert!(encode_tile(&tile, &path, TileFormat::Png, Quality::default()).is_err());
    }

    #[test]
    fn thumbnail_has_exact_dimensions() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("thumb.jpg");
        let source = RgbaImage::from_fn(400, 200, |x, y| Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255]));

        write_thumbnail(&source, &path, 96, 45, Quality::default()).unwrap();
        let (w, h) = image::image_dimensions(&path).unwrap();
        assert_eq!((w, h), (96, 45));
    }

    #[test]
    fn fill_size_covers_target() {
        assert_eq!(fill_size(400, 200, 96, 45), (96, 48));
        assert_eq!(fill_size(100, 300, 96, 45), (96, 288));
        assert_eq!(fill_size(1000, 100, 96, 45), (450, 45));
    }

    #[test]
    fn thumbnail_of_portrait_source_keeps_colour() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("thumb.jpg");
        let source = RgbaImage::from_pixel(100, 300, Rgba([200, 40, 90, 255]));

        write_thumbnail(&source, &path, 96, 45, Quality::default()).unwrap();
        let thumb = image::open(&path).unwrap().into_rgb8();
        assert_eq!(thumb.dimensions(), (96, 45));
        let centre = thumb.get_pixel(48, 22);
        for (got, want) in centre.0.iter().zip([200u8, 40, 90]) {
            assert!(got.abs_diff(want) <= 8, "{centre:?}");
        }
    }
}
