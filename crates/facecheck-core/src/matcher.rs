//! Cosine similarity and the threshold decision rule.

use crate::types::FeatureVector;
use thiserror::Error;

/// Similarity at or above which a probe is accepted as the enrolled user.
pub const DEFAULT_THRESHOLD: f64 = 0.7;

/// Two vectors of different length were compared.
///
/// Extraction always produces vectors of one fixed length, so this signals
/// mixed extraction settings or a foreign record in the store.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("feature dimension mismatch: {left} vs {right}")]
pub struct DimensionMismatch {
    pub left: usize,
    pub right: usize,
}

/// Compute cosine similarity `dot(a, b) / (‖a‖·‖b‖)`.
///
/// Returns 0.0 when either vector has zero norm. Fails when the lengths
/// differ; vectors are never truncated or padded.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> Result<f64, DimensionMismatch> {
    if a.len() != b.len() {
        return Err(DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    Ok(dot / (norm_a * norm_b).sqrt())
}

/// Accept when `similarity >= threshold`.
pub fn decide(similarity: f64, threshold: f64) -> bool {
    similarity >= threshold
}

/// Result of comparing a probe against one enrolled vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchOutcome {
    pub matched: bool,
    pub similarity: f64,
}

/// Strategy for comparing a probe vector against an enrolled one.
pub trait Matcher: Send + Sync {
    fn compare(
        &self,
        probe: &FeatureVector,
        enrolled: &FeatureVector,
        threshold: f64,
    ) -> Result<MatchOutcome, DimensionMismatch>;
}

/// Raw-intensity cosine matcher.
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn compare(
        &self,
        probe: &FeatureVector,
        enrolled: &FeatureVector,
        threshold: f64,
    ) -> Result<MatchOutcome, DimensionMismatch> {
        let similarity = enrolled.similarity(probe)?;
        Ok(MatchOutcome {
            matched: decide(similarity, threshold),
            similarity,
        })
    }
}
