//! Image ingestion from encoded bytes or `data:image/...;base64,` URLs.

use base64::Engine;
use image::RgbImage;
use thiserror::Error;

const DATA_URL_PREFIX: &str = "data:image/";

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("image data is empty")]
    Empty,
    #[error("unrecognized image encoding: {0}")]
    Format(#[from] image::ImageError),
    #[error("image has zero width or height")]
    ZeroDimensions,
    #[error("not an image data URL (expected \"data:image/\" prefix)")]
    NotDataUrl,
    #[error("data URL has no payload separator")]
    MissingPayload,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// A decoded 3-channel color image.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pixels: RgbImage,
}

impl DecodedImage {
    pub fn from_rgb(pixels: RgbImage) -> Result<Self, DecodeError> {
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(DecodeError::ZeroDimensions);
        }
        Ok(Self { pixels })
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn channels(&self) -> u8 {
        3
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }
}

/// Where a probe or enrollment image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Encoded image bytes (JPEG, PNG, WebP, ...).
    Bytes(Vec<u8>),
    /// `data:image/<mime>;base64,<payload>` as produced by browser camera capture.
    DataUrl(String),
}

impl ImageSource {
    /// Classify raw file contents: text starting with `data:image/` is a data
    /// URL, everything else is treated as encoded image bytes.
    pub fn from_file_contents(contents: Vec<u8>) -> Self {
        if contents.starts_with(DATA_URL_PREFIX.as_bytes()) {
            match String::from_utf8(contents) {
                Ok(text) => return Self::DataUrl(text.trim().to_string()),
                Err(e) => return Self::Bytes(e.into_bytes()),
            }
        }
        Self::Bytes(contents)
    }

    pub fn decode(&self) -> Result<DecodedImage, DecodeError> {
        match self {
            Self::Bytes(raw) => decode_bytes(raw),
            Self::DataUrl(url) => decode_data_url(url),
        }
    }
}

/// Decode encoded image bytes into an RGB pixel grid.
///
/// Grayscale and alpha images are converted to 3-channel color.
pub fn decode_bytes(raw: &[u8]) -> Result<DecodedImage, DecodeError> {
    if raw.is_empty() {
        return Err(DecodeError::Empty);
    }
    let decoded = image::load_from_memory(raw)?;
    tracing::debug!(
        width = decoded.width(),
        height = decoded.height(),
        color = ?decoded.color(),
        "decoded image"
    );
    DecodedImage::from_rgb(decoded.to_rgb8())
}

/// Decode a `data:image/<mime>;base64,<payload>` string.
pub fn decode_data_url(url: &str) -> Result<DecodedImage, DecodeError> {
    if !url.starts_with(DATA_URL_PREFIX) {
        return Err(DecodeError::NotDataUrl);
    }
    let (_header, payload) = url.split_once(',').ok_or(DecodeError::MissingPayload)?;
    let bytes = base64::engine::general_purpose::STANDARD.decode(payload.trim())?;
    decode_bytes(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb};
    use std::io::Cursor;

    fn png_bytes(img: DynamicImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn sample_rgb() -> RgbImage {
        RgbImage::from_fn(8, 6, |x, y| Rgb([(x * 30) as u8, (y * 40) as u8, 200]))
    }

    #[test]
    fn test_decode_png_bytes() {
        let bytes = png_bytes(DynamicImage::ImageRgb8(sample_rgb()));
        let img = decode_bytes(&bytes).unwrap();
        assert_eq!(img.width(), 8);
        assert_eq!(img.height(), 6);
        assert_eq!(img.channels(), 3);
        assert_eq!(img.pixels().get_pixel(2, 3), &Rgb([60, 120, 200]));
    }

    #[test]
    fn test_decode_grayscale_as_color() {
        let gray = GrayImage::from_pixel(4, 4, Luma([77]));
        let bytes = png_bytes(DynamicImage::ImageLuma8(gray));
        let img = decode_bytes(&bytes).unwrap();
        assert_eq!(img.pixels().get_pixel(0, 0), &Rgb([77, 77, 77]));
    }

    #[test]
    fn test_decode_empty_bytes() {
        assert!(matches!(decode_bytes(&[]), Err(DecodeError::Empty)));
    }

    #[test]
    fn test_decode_garbage_bytes() {
        let err = decode_bytes(b"definitely not an image").unwrap_err();
        assert!(matches!(err, DecodeError::Format(_)));
    }

    #[test]
    fn test_decode_data_url() {
        let bytes = png_bytes(DynamicImage::ImageRgb8(sample_rgb()));
        let url = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&bytes)
        );
        let img = decode_data_url(&url).unwrap();
        assert_eq!((img.width(), img.height()), (8, 6));
    }

    #[test]
    fn test_decode_data_url_wrong_prefix() {
        let err = decode_data_url("data:text/plain;base64,aGVsbG8=").unwrap_err();
        assert!(matches!(err, DecodeError::NotDataUrl));
    }

    #[test]
    fn test_decode_data_url_missing_separator() {
        let err = decode_data_url("data:image/png;base64").unwrap_err();
        assert!(matches!(err, DecodeError::MissingPayload));
    }

    #[test]
    fn test_decode_data_url_invalid_base64() {
        let err = decode_data_url("data:image/png;base64,@@not-base64@@").unwrap_err();
        assert!(matches!(err, DecodeError::Base64(_)));
    }

    #[test]
    fn test_decode_data_url_valid_base64_but_not_image() {
        let err = decode_data_url("data:image/png;base64,aGVsbG8gd29ybGQ=").unwrap_err();
        assert!(matches!(err, DecodeError::Format(_)));
    }

    #[test]
    fn test_image_source_sniffs_data_url() {
        let src = ImageSource::from_file_contents(b"data:image/jpeg;base64,AAAA\n".to_vec());
        assert_eq!(src, ImageSource::DataUrl("data:image/jpeg;base64,AAAA".into()));

        let src = ImageSource::from_file_contents(vec![0x89, b'P', b'N', b'G']);
        assert!(matches!(src, ImageSource::Bytes(_)));
    }

    #[test]
    fn test_image_source_decode_dispatch() {
        let bytes = png_bytes(DynamicImage::ImageRgb8(sample_rgb()));
        let img = ImageSource::Bytes(bytes).decode().unwrap();
        assert_eq!(img.width(), 8);
    }
}
