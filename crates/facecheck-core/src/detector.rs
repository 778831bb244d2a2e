//! Frontal face localization.
//!
//! The production locator runs the pretrained SeetaFace funnel-structured
//! cascade (via `rustface`) over a grayscale derivation of the image.

use crate::decoder::DecodedImage;
use crate::types::FaceRegion;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use thiserror::Error;

// --- Detector tuning defaults ---
const DEFAULT_SCALE_FACTOR: f32 = 1.1;
const DEFAULT_MIN_NEIGHBORS: u32 = 4;
const DEFAULT_MIN_FACE_SIZE: u32 = 20;
const DEFAULT_WINDOW_STEP: u32 = 4;
/// Cascade score required per unit of `min_neighbors`.
const SCORE_PER_NEIGHBOR: f64 = 0.5;

// --- Ranges the SeetaFace detector accepts ---
const MIN_SCORE_THRESHOLD: f64 = 0.01;
const MIN_DETECTOR_FACE_SIZE: u32 = 20;
const MIN_PYRAMID_SCALE: f32 = 0.01;
const MAX_PYRAMID_SCALE: f32 = 0.99;

#[derive(Error, Debug)]
pub enum LocatorError {
    #[error("face detector model not found: {0}")]
    ModelNotFound(String),
    #[error("failed to load face detector model {path}: {reason}")]
    ModelLoad { path: String, reason: String },
}

/// Sensitivity parameters for the face locator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Ratio between consecutive image-pyramid levels (> 1.0).
    pub scale_factor: f32,
    /// Evidence a candidate window needs before it is reported as a face.
    pub min_neighbors: u32,
    /// Smallest face side length searched for, in pixels.
    pub min_face_size: u32,
    /// Sliding-window stride in pixels.
    pub window_step: u32,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            scale_factor: DEFAULT_SCALE_FACTOR,
            min_neighbors: DEFAULT_MIN_NEIGHBORS,
            min_face_size: DEFAULT_MIN_FACE_SIZE,
            window_step: DEFAULT_WINDOW_STEP,
        }
    }
}

impl LocatorConfig {
    /// Pyramid shrink factor in rustface terms, kept within `[0.01, 0.99]`.
    fn pyramid_scale(&self) -> f32 {
        if self.scale_factor > 1.0 {
            (1.0 / self.scale_factor).clamp(MIN_PYRAMID_SCALE, MAX_PYRAMID_SCALE)
        } else {
            1.0 / DEFAULT_SCALE_FACTOR
        }
    }

    /// Detector score threshold; `min_neighbors = 0` still yields a small
    /// positive threshold.
    fn score_threshold(&self) -> f64 {
        (self.min_neighbors as f64 * SCORE_PER_NEIGHBOR).max(MIN_SCORE_THRESHOLD)
    }

    fn detector_face_size(&self) -> u32 {
        self.min_face_size.max(MIN_DETECTOR_FACE_SIZE)
    }

    fn window_step(&self) -> u32 {
        self.window_step.max(1)
    }

    /// True when every field is already inside the detector's accepted range.
    fn is_within_detector_limits(&self) -> bool {
        let pyramid = 1.0 / self.scale_factor;
        self.min_neighbors > 0
            && self.min_face_size >= MIN_DETECTOR_FACE_SIZE
            && self.window_step > 0
            && self.scale_factor > 1.0
            && (MIN_PYRAMID_SCALE..=MAX_PYRAMID_SCALE).contains(&pyramid)
    }
}

/// Finds candidate face regions in a decoded image.
///
/// Internal detector failures are reported as "no faces", never as errors.
pub trait FaceLocator: Send + Sync {
    fn locate(&self, image: &DecodedImage) -> Vec<FaceRegion>;
}

/// Face locator backed by the SeetaFace frontal cascade.
pub struct SeetaFaceLocator {
    model: rustface::Model,
    config: LocatorConfig,
}

impl SeetaFaceLocator {
    /// Load the SeetaFace model (`seeta_fd_frontal_v1.0.bin`) from `model_path`.
    pub fn load(model_path: &Path, config: LocatorConfig) -> Result<Self, LocatorError> {
        let path_str = model_path.display().to_string();
        if !model_path.exists() {
            return Err(LocatorError::ModelNotFound(path_str));
        }

        let file = File::open(model_path).map_err(|e| LocatorError::ModelLoad {
            path: path_str.clone(),
            reason: e.to_string(),
        })?;

        // rustface panics on an unknown classifier kind instead of returning an error.
        let parsed = panic::catch_unwind(AssertUnwindSafe(|| {
            rustface::read_model(BufReader::new(file))
        }));
        let model = match parsed {
            Ok(Ok(model)) => model,
            Ok(Err(e)) => {
                return Err(LocatorError::ModelLoad {
                    path: path_str,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(LocatorError::ModelLoad {
                    path: path_str,
                    reason: "malformed model structure".into(),
                })
            }
        };

        if !config.is_within_detector_limits() {
            tracing::warn!(
                scale_factor = config.scale_factor,
                min_neighbors = config.min_neighbors,
                min_face_size = config.min_face_size,
                window_step = config.window_step,
                "locator settings outside detector limits; clamping"
            );
        }

        tracing::info!(
            path = %path_str,
            scale_factor = config.scale_factor,
            min_neighbors = config.min_neighbors,
            min_face_size = config.min_face_size,
            "loaded SeetaFace model"
        );

        Ok(Self { model, config })
    }

    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }
}

impl FaceLocator for SeetaFaceLocator {
    fn locate(&self, image: &DecodedImage) -> Vec<FaceRegion> {
        let (width, height) = (image.width(), image.height());
        let min_face_size = self.config.detector_face_size();
        if width < min_face_size || height < min_face_size {
            tracing::debug!(
                width,
                height,
                min_face_size,
                "image smaller than minimum face size; no faces"
            );
            return Vec::new();
        }

        let gray = image::imageops::grayscale(image.pixels());

        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(self.config.detector_face_size());
        detector.set_score_thresh(self.config.score_threshold());
        detector.set_pyramid_scale_factor(self.config.pyramid_scale());
        detector.set_slide_window_step(self.config.window_step(), self.config.window_step());

        let faces = detector.detect(&rustface::ImageData::new(gray.as_raw(), width, height));

        let regions: Vec<FaceRegion> = faces
            .iter()
            .filter_map(|face| {
                let bbox = face.bbox();
                clamp_box(bbox.x(), bbox.y(), bbox.width(), bbox.height(), width, height)
            })
            .collect();

        tracing::debug!(
            raw = faces.len(),
            kept = regions.len(),
            "face localization complete"
        );
        regions
    }
}

/// Clamp a detector box (which may start off-image) to the image bounds.
///
/// Returns `None` when nothing of the box remains inside the image.
fn clamp_box(x: i32, y: i32, w: u32, h: u32, img_w: u32, img_h: u32) -> Option<FaceRegion> {
    let x0 = i64::from(x).clamp(0, i64::from(img_w));
    let y0 = i64::from(y).clamp(0, i64::from(img_h));
    let x1 = (i64::from(x) + i64::from(w)).clamp(0, i64::from(img_w));
    let y1 = (i64::from(y) + i64::from(h)).clamp(0, i64::from(img_h));

    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    Some(FaceRegion::new(y0 as u32, x1 as u32, y1 as u32, x0 as u32))
}
