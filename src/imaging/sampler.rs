//! Mapping sphere coordinates onto source pixels.
//!
//! The pyramid builder asks "what colour is the sky at (RA, Dec)?" through the
//! [`Sampler`] trait. Coordinates are equatorial, in radians, RA in any range
//! and Dec in `[-π/2, π/2]`.
//!
//! [`PlateCarreeSampler`] answers from an equirectangular image laid out the
//! way sky surveys publish all-sky maps: column 0 is longitude +180°,
//! longitude increases to the left, row 0 is latitude +90°. The image can be
//! in either the equatorial or the galactic frame; galactic maps are rotated
//! with the J2000 equatorial→galactic matrix before the lookup.

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI, TAU};

/// Source of pixel values for sphere positions.
///
/// Must be `Sync`: tiles are rendered in parallel and share one sampler.
pub trait Sampler: Sync {
    /// Colour at equatorial longitude `lon` and latitude `lat`, in radians.
    fn sample(&self, lon: f64, lat: f64) -> Rgba<u8>;
}

/// Coordinate frame an equirectangular source image is laid out in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frame {
    /// Galactic longitude/latitude (l, b).
    #[default]
    Galactic,
    /// Right ascension/declination.
    Equatorial,
}

/// Rotation from J2000 equatorial to galactic unit vectors (Hipparcos A_G).
const EQUATORIAL_TO_GALACTIC: [[f64; 3]; 3] = [
    [-0.054_875_560_416_215_4, -0.873_437_090_234_885, -0.483_835_015_548_713_2],
    [0.494_109_427_875_583_7, -0.444_829_629_960_011_2, 0.746_982_244_497_218_9],
    [-0.867_666_149_019_004_7, -0.198_076_373_431_201_5, 0.455_983_776_175_066_9],
];

/// Convert equatorial (RA, Dec) to galactic (l, b), all in radians.
///
/// Galactic longitude is returned in `(-π, π]`.
pub fn equatorial_to_galactic(ra: f64, dec: f64) -> (f64, f64) {
    let (sin_ra, cos_ra) = ra.sin_cos();
    let (sin_dec, cos_dec) = dec.sin_cos();
    let v = [cos_dec * cos_ra, cos_dec * sin_ra, sin_dec];

    let m = &EQUATORIAL_TO_GALACTIC;
    let g = [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ];

    let l = g[1].atan2(g[0]);
    let b = g[2].clamp(-1.0, 1.0).asin();
    (l, b)
}

/// Nearest-pixel sampler over an equirectangular image.
pub struct PlateCarreeSampler<'a> {
    image: &'a RgbaImage,
    frame: Frame,
}

impl<'a> PlateCarreeSampler<'a> {
    pub fn new(image: &'a RgbaImage, frame: Frame) -> Self {
        Self { image, frame }
    }

    /// Pixel column and row holding frame coordinates `(lon, lat)`.
    pub fn pixel_for(&self, lon: f64, lat: f64) -> (u32, u32) {
        let (width, height) = self.image.dimensions();
        let u = (PI - lon).rem_euclid(TAU) / TAU;
        let v = (FRAC_PI_2 - lat) / PI;
        let ix = (u * f64::from(width)).floor().clamp(0.0, f64::from(width - 1));
        let iy = (v * f64::from(height)).floor().clamp(0.0, f64::from(height - 1));
        (ix as u32, iy as u32)
    }
}

impl Sampler for PlateCarreeSampler<'_> {
    fn sample(&self, lon: f64, lat: f64) -> Rgba<u8> {
        let (lon, lat) = match self.frame {
            Frame::Equatorial => (lon, lat),
            Frame::Galactic => equatorial_to_galactic(lon, lat),
        };
        let (x, y) = self.pixel_for(lon, lat);
        *self.image.get_pixel(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn galactic_centre_maps_to_origin() {
        // Galactic centre: RA 266.405°, Dec -28.936°
        let (l, b) = equatorial_to_galactic(266.405_f64.to_radians(), (-28.936_f64).to_radians());
        assert!(close(l.to_degrees(), 0.0, 0.05), "l = {}", l.to_degrees());
        assert!(close(b.to_degrees(), 0.0, 0.05), "b = {}", b.to_degrees());
    }

    #[test]
    fn north_galactic_pole() {
        let (_, b) = equatorial_to_galactic(192.859_f64.to_radians(), 27.128_f64.to_radians());
        assert!(close(b.to_degrees(), 90.0, 0.01), "b = {}", b.to_degrees());
    }

    #[test]
    fn rotation_matrix_is_orthonormal() {
        let m = &EQUATORIAL_TO_GALACTIC;
        for i in 0..3 {
            for j in 0..3 {
                let dot: f64 = (0..3).map(|k| m[i][k] * m[j][k]).sum();
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!(close(dot, expected, 1e-9));
            }
        }
    }

    #[test]
    fn pixel_for_layout() {
        let image = RgbaImage::new(360, 180);
        let sampler = PlateCarreeSampler::new(&image, Frame::Equatorial);

        // Longitude +180° is the left edge, 0° the centre column
        assert_eq!(sampler.pixel_for(PI - 1e-9, 0.0).0, 0);
        assert_eq!(sampler.pixel_for(0.0, 0.0).0, 180);
        // Longitude increases to the left
        assert_eq!(sampler.pixel_for(89.5_f64.to_radians(), 0.0).0, 90);
        assert_eq!(sampler.pixel_for((-90.5_f64).to_radians(), 0.0).0, 270);
        // Longitude wraps
        assert_eq!(
            sampler.pixel_for(269.5_f64.to_radians(), 0.0),
            sampler.pixel_for((-90.5_f64).to_radians(), 0.0)
        );
        // Rows run from +90° at the top to -90° at the bottom, clamped
        assert_eq!(sampler.pixel_for(0.0, FRAC_PI_2).1, 0);
        assert_eq!(sampler.pixel_for(0.0, -FRAC_PI_2).1, 179);
        assert_eq!(sampler.pixel_for(0.0, 0.0).1, 90);
    }

    #[test]
    fn equatorial_sample_reads_expected_pixel() {
        let image = RgbaImage::from_fn(4, 2, |x, y| Rgba([x as u8, y as u8, 0, 255]));
        let sampler = PlateCarreeSampler::new(&image, Frame::Equatorial);

        // RA 135° falls in the first column of four; Dec +45° in the top row
        let px = sampler.sample(135_f64.to_radians(), 45_f64.to_radians());
        assert_eq!(px, Rgba([0, 0, 0, 255]));
        let px = sampler.sample(-45_f64.to_radians(), -45_f64.to_radians());
        assert_eq!(px, Rgba([2, 1, 0, 255]));
    }

    #[test]
    fn galactic_sample_of_galactic_centre_hits_image_centre() {
        let image = RgbaImage::from_fn(360, 180, |x, y| {
            if (178..182).contains(&x) && (88..92).contains(&y) {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        });
        let sampler = PlateCarreeSampler::new(&image, Frame::Galactic);
        let px = sampler.sample(266.405_f64.to_radians(), (-28.936_f64).to_radians());
        assert_eq!(px, Rgba([255, 0, 0, 255]));
    }
}
