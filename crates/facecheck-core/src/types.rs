use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::matcher::{self, DimensionMismatch};

/// Rectangular face area in pixel coordinates.
///
/// Edges are exclusive on the bottom/right side, so a region produced by a
/// locator satisfies `top < bottom <= height` and `left < right <= width`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FaceRegion {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl FaceRegion {
    pub fn new(top: u32, right: u32, bottom: u32, left: u32) -> Self {
        Self { top, right, bottom, left }
    }

    /// Build a region from an `(x, y, width, height)` box.
    pub fn from_xywh(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            top: y,
            right: x.saturating_add(width),
            bottom: y.saturating_add(height),
            left: x,
        }
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// True when the region lies entirely inside a `width × height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right <= width && self.bottom <= height
    }
}

/// Normalized intensity profile of one face, flattened row-major.
///
/// Values lie in `[0.0, 1.0]`; the length is the square of the extraction
/// resolution (16384 for the default 128×128).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub values: Vec<f64>,
}

impl FeatureVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Cosine similarity against another vector of the same length.
    ///
    /// Returns a value in [-1, 1]; all-zero vectors score 0.0.
    pub fn similarity(&self, other: &FeatureVector) -> Result<f64, DimensionMismatch> {
        matcher::cosine_similarity(&self.values, &other.values)
    }
}

/// Outcome of a verification attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationDecision {
    pub matched: bool,
    /// Cosine similarity against the enrolled vector, 0.0 when no comparison ran.
    pub similarity: f64,
    pub message: String,
}

impl VerificationDecision {
    pub(crate) fn rejected(message: impl Into<String>) -> Self {
        Self {
            matched: false,
            similarity: 0.0,
            message: message.into(),
        }
    }
}

/// Outcome of an enrollment attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentResult {
    pub ok: bool,
    pub message: String,
}

/// Summary of one stored enrollment, without the vector itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentInfo {
    pub user_id: String,
    pub dimension: usize,
    pub enrolled_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_dimensions() {
        let r = FaceRegion::new(10, 60, 90, 20);
        assert_eq!(r.width(), 40);
        assert_eq!(r.height(), 80);
        assert!(!r.is_empty());
    }

    #[test]
    fn test_region_from_xywh() {
        let r = FaceRegion::from_xywh(5, 7, 30, 40);
        assert_eq!(r, FaceRegion::new(7, 35, 47, 5));
    }

    #[test]
    fn test_inverted_region_is_empty() {
        let r = FaceRegion::new(50, 10, 20, 40);
        assert_eq!(r.width(), 0);
        assert_eq!(r.height(), 0);
        assert!(r.is_empty());
    }

    #[test]
    fn test_region_fits_within() {
        let r = FaceRegion::new(0, 100, 100, 0);
        assert!(r.fits_within(100, 100));
        assert!(!r.fits_within(99, 100));
        assert!(!r.fits_within(100, 99));
    }

    #[test]
    fn test_decision_serializes_to_toml() {
        let d = VerificationDecision {
            matched: true,
            similarity: 0.5,
            message: "ok".into(),
        };
        let encoded = toml::to_string(&d).unwrap();
        assert!(encoded.contains("matched = true"));
    }
}
