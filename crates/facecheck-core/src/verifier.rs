//! Enrollment and verification orchestration.
//!
//! Each attempt runs decode → locate → extract, then either stores the vector
//! (enroll) or compares it with the stored one (verify). Pipeline failures
//! become a negative result with a specific message; store failures and
//! dimension mismatches are returned as errors.

use crate::decoder::{DecodeError, ImageSource};
use crate::detector::FaceLocator;
use crate::extractor::{ExtractionError, FeatureExtractor, DEFAULT_RESOLUTION};
use crate::matcher::{CosineMatcher, DimensionMismatch, Matcher, DEFAULT_THRESHOLD};
use crate::store::{FeatureStore, StoreError};
use crate::types::{EnrollmentInfo, EnrollmentResult, FeatureVector, VerificationDecision};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Recoverable reasons an attempt was turned down.
#[derive(Error, Debug)]
pub enum Rejection {
    #[error("Could not process captured image: {0}")]
    Decode(#[from] DecodeError),
    #[error("No face detected in the image")]
    NoFaceDetected,
    #[error("Multiple faces detected ({count}). Please ensure only one face is visible")]
    AmbiguousFace { count: usize },
    #[error("Could not extract face features: {0}")]
    Extraction(#[from] ExtractionError),
    #[error("No stored face features found")]
    NotEnrolled,
}

/// Failures the caller should treat as infrastructure errors, not as a
/// non-matching face.
#[derive(Error, Debug)]
pub enum VerifierError {
    #[error("feature store error: {0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    DimensionMismatch(#[from] DimensionMismatch),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Minimum cosine similarity for a match.
    pub threshold: f64,
    /// Side length of the square face crop used for features.
    pub resolution: u32,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            resolution: DEFAULT_RESOLUTION,
        }
    }
}

pub struct Verifier {
    locator: Box<dyn FaceLocator>,
    extractor: FeatureExtractor,
    store: Arc<dyn FeatureStore>,
    threshold: f64,
}

impl Verifier {
    pub fn new(
        locator: Box<dyn FaceLocator>,
        store: Arc<dyn FeatureStore>,
        config: &VerifierConfig,
    ) -> Self {
        Self {
            locator,
            extractor: FeatureExtractor::with_resolution(config.resolution),
            store,
            threshold: config.threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Register the single face in `source` as `user_id`'s reference,
    /// replacing any previous enrollment.
    pub fn enroll(
        &self,
        user_id: &str,
        source: &ImageSource,
    ) -> Result<EnrollmentResult, VerifierError> {
        let features = match self.capture_features(source) {
            Ok(f) => f,
            Err(Reject::Rejected(rejection)) => {
                tracing::info!(user_id, reason = %rejection, "enroll: rejected");
                return Ok(EnrollmentResult {
                    ok: false,
                    message: rejection.to_string(),
                });
            }
            Err(Reject::Failed(err)) => return Err(err),
        };

        self.store.save(user_id, &features)?;
        tracing::info!(user_id, dim = features.len(), "enroll: stored face features");

        Ok(EnrollmentResult {
            ok: true,
            message: "Face enrolled successfully".into(),
        })
    }

    /// Compare the single face in `source` with `user_id`'s enrollment.
    pub fn verify(
        &self,
        user_id: &str,
        source: &ImageSource,
    ) -> Result<VerificationDecision, VerifierError> {
        let outcome = self
            .capture_features(source)
            .and_then(|probe| Ok((probe, self.load_enrolled(user_id)?)));

        let (probe, enrolled) = match outcome {
            Ok(pair) => pair,
            Err(Reject::Rejected(rejection)) => {
                tracing::info!(user_id, reason = %rejection, "verify: rejected");
                return Ok(VerificationDecision::rejected(rejection.to_string()));
            }
            Err(Reject::Failed(err)) => return Err(err),
        };

        let result = CosineMatcher.compare(&probe, &enrolled, self.threshold)?;
        tracing::info!(
            user_id,
            similarity = result.similarity,
            threshold = self.threshold,
            matched = result.matched,
            "verify: decision"
        );

        let message = if result.matched {
            format!("Face verified with {:.2}% confidence", result.similarity * 100.0)
        } else {
            format!("Face does not match. Similarity: {:.2}%", result.similarity * 100.0)
        };

        Ok(VerificationDecision {
            matched: result.matched,
            similarity: result.similarity,
            message,
        })
    }

    pub fn is_enrolled(&self, user_id: &str) -> Result<bool, VerifierError> {
        Ok(self.store.exists(user_id)?)
    }

    /// Returns `false` when the user had no enrollment.
    pub fn remove_enrollment(&self, user_id: &str) -> Result<bool, VerifierError> {
        let removed = self.store.delete(user_id)?;
        tracing::info!(user_id, removed, "enrollment removal");
        Ok(removed)
    }

    pub fn enrollments(&self) -> Result<Vec<EnrollmentInfo>, VerifierError> {
        Ok(self.store.list()?)
    }

    /// Decode, require exactly one face, and extract its features.
    fn capture_features(&self, source: &ImageSource) -> Result<FeatureVector, Reject> {
        let image = source.decode().map_err(Rejection::from)?;

        let regions = self.locator.locate(&image);
        let region = match regions.as_slice() {
            [] => return Err(Rejection::NoFaceDetected.into()),
            [single] => *single,
            many => {
                return Err(Rejection::AmbiguousFace { count: many.len() }.into());
            }
        };
        tracing::debug!(?region, "single face located");

        Ok(self
            .extractor
            .extract(&image, &region)
            .map_err(Rejection::from)?)
    }

    fn load_enrolled(&self, user_id: &str) -> Result<FeatureVector, Reject> {
        match self.store.load(user_id) {
            Ok(Some(v)) => Ok(v),
            Ok(None) => Err(Rejection::NotEnrolled.into()),
            Err(e) => Err(Reject::Failed(e.into())),
        }
    }
}

/// Internal split between a user-facing rejection and a hard failure.
enum Reject {
    Rejected(Rejection),
    Failed(VerifierError),
}

impl From<Rejection> for Reject {
    fn from(r: Rejection) -> Self {
        Reject::Rejected(r)
    }
}
