//! facecheck-core: face enrollment and verification engine.
//!
//! Locates a single face with the SeetaFace frontal cascade, reduces it to a
//! 128×128 normalized intensity vector, and compares it with the user's
//! enrolled vector by cosine similarity.

pub mod config;
pub mod decoder;
pub mod detector;
pub mod extractor;
pub mod matcher;
pub mod store;
pub mod types;
pub mod verifier;

pub use config::{Settings, StoreBackend};
pub use decoder::{DecodedImage, ImageSource};
pub use detector::{FaceLocator, LocatorConfig, SeetaFaceLocator};
pub use extractor::FeatureExtractor;
pub use store::{FeatureStore, StoreError};
pub use types::{EnrollmentInfo, EnrollmentResult, FaceRegion, FeatureVector, VerificationDecision};
pub use verifier::{Verifier, VerifierConfig, VerifierError};
