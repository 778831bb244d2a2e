//! Fixed-size intensity feature extraction from a face region.
//!
//! Crop → bilinear resize to `resolution × resolution` → BT.601 luma →
//! divide by 255 → flatten row-major.

use crate::decoder::DecodedImage;
use crate::types::{FaceRegion, FeatureVector};
use image::RgbImage;
use thiserror::Error;

// --- Named constants ---
pub const DEFAULT_RESOLUTION: u32 = 128;
/// Feature length for the default resolution.
pub const DEFAULT_FEATURE_DIM: usize = (DEFAULT_RESOLUTION * DEFAULT_RESOLUTION) as usize;
const LUMA_R: f32 = 0.299;
const LUMA_G: f32 = 0.587;
const LUMA_B: f32 = 0.114;
const INTENSITY_SCALE: f64 = 255.0;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("face region {0:?} has zero width or height")]
    DegenerateRegion(FaceRegion),
    #[error("face region {region:?} lies outside the {width}x{height} image")]
    OutOfBounds {
        region: FaceRegion,
        width: u32,
        height: u32,
    },
}

/// Converts a face region into a [`FeatureVector`].
#[derive(Debug, Clone, Copy)]
pub struct FeatureExtractor {
    resolution: u32,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION,
        }
    }
}

impl FeatureExtractor {
    /// Extractor producing `resolution²`-length vectors. A resolution of 0 is
    /// raised to 1.
    pub fn with_resolution(resolution: u32) -> Self {
        Self {
            resolution: resolution.max(1),
        }
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Length of every vector this extractor produces.
    pub fn dimension(&self) -> usize {
        (self.resolution as usize).pow(2)
    }

    pub fn extract(
        &self,
        image: &DecodedImage,
        region: &FaceRegion,
    ) -> Result<FeatureVector, ExtractionError> {
        if region.is_empty() {
            return Err(ExtractionError::DegenerateRegion(*region));
        }
        if !region.fits_within(image.width(), image.height()) {
            return Err(ExtractionError::OutOfBounds {
                region: *region,
                width: image.width(),
                height: image.height(),
            });
        }

        let crop = image::imageops::crop_imm(
            image.pixels(),
            region.left,
            region.top,
            region.width(),
            region.height(),
        )
        .to_image();

        let size = self.resolution as usize;
        let resized = resize_bilinear(&crop, size, size);

        let values = resized
            .chunks_exact(3)
            .map(|px| f64::from(luma(px[0], px[1], px[2])) / INTENSITY_SCALE)
            .collect();

        Ok(FeatureVector::new(values))
    }
}

/// Extract with the default 128×128 resolution.
pub fn extract(image: &DecodedImage, region: &FaceRegion) -> Result<FeatureVector, ExtractionError> {
    FeatureExtractor::default().extract(image, region)
}

/// ITU-R BT.601 luma, rounded to 8 bits.
fn luma(r: u8, g: u8, b: u8) -> u8 {
    let y = LUMA_R * r as f32 + LUMA_G * g as f32 + LUMA_B * b as f32;
    y.round().clamp(0.0, 255.0) as u8
}

/// Resize an RGB image with bilinear interpolation on half-pixel centers.
///
/// Returns packed RGB bytes of length `new_w * new_h * 3`.
fn resize_bilinear(src: &RgbImage, new_w: usize, new_h: usize) -> Vec<u8> {
    let width = src.width() as usize;
    let height = src.height() as usize;
    let data = src.as_raw();
    let scale_x = width as f32 / new_w as f32;
    let scale_y = height as f32 / new_h as f32;

    let mut resized = vec![0u8; new_w * new_h * 3];
    for y in 0..new_h {
        let src_y = (y as f32 + 0.5) * scale_y - 0.5;
        let y0 = (src_y.floor() as i32).clamp(0, height as i32 - 1) as usize;
        let y1 = (y0 + 1).min(height - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);
        let fy = if src_y < 0.0 { 0.0 } else { fy };

        for x in 0..new_w {
            let src_x = (x as f32 + 0.5) * scale_x - 0.5;
            let x0 = (src_x.floor() as i32).clamp(0, width as i32 - 1) as usize;
            let x1 = (x0 + 1).min(width - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);
            let fx = if src_x < 0.0 { 0.0 } else { fx };

            for c in 0..3 {
                let tl = data[(y0 * width + x0) * 3 + c] as f32;
                let tr = data[(y0 * width + x1) * 3 + c] as f32;
                let bl = data[(y1 * width + x0) * 3 + c] as f32;
                let br = data[(y1 * width + x1) * 3 + c] as f32;

                let val = tl * (1.0 - fx) * (1.0 - fy)
                    + tr * fx * (1.0 - fy)
                    + bl * (1.0 - fx) * fy
                    + br * fx * fy;

                resized[(y * new_w + x) * 3 + c] = val.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    resized
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn image_from_fn(w: u32, h: u32, f: impl Fn(u32, u32) -> Rgb<u8>) -> DecodedImage {
        DecodedImage::from_rgb(RgbImage::from_fn(w, h, f)).unwrap()
    }

    #[test]
    fn test_extract_default_dimension() {
        let img = image_from_fn(200, 150, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 90]));
        let fv = extract(&img, &FaceRegion::new(10, 110, 130, 20)).unwrap();
        assert_eq!(fv.len(), DEFAULT_FEATURE_DIM);
        assert_eq!(fv.len(), 16384);
    }

    #[test]
    fn test_extract_values_normalized() {
        let img = image_from_fn(64, 64, |x, y| Rgb([(x * 4) as u8, (y * 4) as u8, 255]));
        let fv = extract(&img, &FaceRegion::new(0, 64, 64, 0)).unwrap();
        assert!(fv.values.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_extract_uniform_region() {
        // BT.601 luma of (200, 100, 50) = 59.8 + 58.7 + 5.7 = 124.2 -> 124
        let img = image_from_fn(50, 50, |_, _| Rgb([200, 100, 50]));
        let fv = extract(&img, &FaceRegion::new(5, 45, 45, 5)).unwrap();
        let expected = 124.0 / 255.0;
        assert!(fv.values.iter().all(|&v| v == expected));
    }

    #[test]
    fn test_extract_white_and_black() {
        let white = image_from_fn(16, 16, |_, _| Rgb([255, 255, 255]));
        let fv = extract(&white, &FaceRegion::new(0, 16, 16, 0)).unwrap();
        assert!(fv.values.iter().all(|&v| v == 1.0));

        let black = image_from_fn(16, 16, |_, _| Rgb([0, 0, 0]));
        let fv = extract(&black, &FaceRegion::new(0, 16, 16, 0)).unwrap();
        assert!(fv.values.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_extract_deterministic() {
        let img = image_from_fn(120, 90, |x, y| {
            Rgb([((x * 7 + y * 3) % 256) as u8, ((x * y) % 256) as u8, (y * 2 % 256) as u8])
        });
        let region = FaceRegion::new(12, 100, 80, 30);
        let a = extract(&img, &region).unwrap();
        let b = extract(&img, &region).unwrap();
        assert_eq!(a.values.len(), b.values.len());
        assert!(a
            .values
            .iter()
            .zip(b.values.iter())
            .all(|(x, y)| x.to_bits() == y.to_bits()));
    }

    #[test]
    fn test_extract_row_major_order() {
        // Top half white, bottom half black: first row bright, last row dark.
        let img = image_from_fn(32, 32, |_, y| {
            if y < 16 { Rgb([255, 255, 255]) } else { Rgb([0, 0, 0]) }
        });
        let ex = FeatureExtractor::with_resolution(4);
        let fv = ex.extract(&img, &FaceRegion::new(0, 32, 32, 0)).unwrap();
        assert_eq!(fv.len(), 16);
        assert!(fv.values[..4].iter().all(|&v| v == 1.0));
        assert!(fv.values[12..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_extract_custom_resolution() {
        let img = image_from_fn(40, 40, |_, _| Rgb([10, 20, 30]));
        let ex = FeatureExtractor::with_resolution(32);
        assert_eq!(ex.dimension(), 1024);
        let fv = ex.extract(&img, &FaceRegion::new(0, 40, 40, 0)).unwrap();
        assert_eq!(fv.len(), 1024);
    }

    #[test]
    fn test_extract_degenerate_region() {
        let img = image_from_fn(40, 40, |_, _| Rgb([10, 20, 30]));
        let err = extract(&img, &FaceRegion::new(10, 10, 30, 10)).unwrap_err();
        assert!(matches!(err, ExtractionError::DegenerateRegion(_)));

        let err = extract(&img, &FaceRegion::new(10, 30, 10, 0)).unwrap_err();
        assert!(matches!(err, ExtractionError::DegenerateRegion(_)));
    }

    #[test]
    fn test_extract_out_of_bounds() {
        let img = image_from_fn(40, 40, |_, _| Rgb([10, 20, 30]));
        let err = extract(&img, &FaceRegion::new(0, 41, 20, 0)).unwrap_err();
        assert!(matches!(err, ExtractionError::OutOfBounds { width: 40, height: 40, .. }));
    }

    #[test]
    fn test_luma_weights() {
        assert_eq!(luma(255, 255, 255), 255);
        assert_eq!(luma(0, 0, 0), 0);
        assert_eq!(luma(255, 0, 0), 76);
        assert_eq!(luma(0, 255, 0), 150);
        assert_eq!(luma(0, 0, 255), 29);
    }

    #[test]
    fn test_bilinear_resize_uniform() {
        let src = RgbImage::from_pixel(10, 7, Rgb([128, 64, 32]));
        let out = resize_bilinear(&src, 25, 25);
        assert_eq!(out.len(), 25 * 25 * 3);
        assert!(out.chunks_exact(3).all(|px| px == [128, 64, 32]));
    }

    #[test]
    fn test_bilinear_resize_single_pixel_source() {
        let src = RgbImage::from_pixel(1, 1, Rgb([9, 8, 7]));
        let out = resize_bilinear(&src, 3, 3);
        assert!(out.chunks_exact(3).all(|px| px == [9, 8, 7]));
    }
}
