//! Enrollment persistence: one feature vector per user identifier.

pub mod codec;
pub mod file;
pub mod memory;
pub mod sqlite;

pub use file::FileFeatureStore;
pub use memory::MemoryFeatureStore;
pub use sqlite::SqliteFeatureStore;

use crate::types::{EnrollmentInfo, FeatureVector};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("corrupt enrollment record for {user_id}: {reason}")]
    Corrupt { user_id: String, reason: String },
    #[error("store lock poisoned")]
    Poisoned,
}

/// Key-value store of enrolled feature vectors.
///
/// `save` replaces any existing record atomically: a concurrent `load` sees
/// either the old vector or the new one, never a partial write.
pub trait FeatureStore: Send + Sync {
    fn save(&self, user_id: &str, vector: &FeatureVector) -> Result<(), StoreError>;

    /// Returns `None` when the user has no enrollment.
    fn load(&self, user_id: &str) -> Result<Option<FeatureVector>, StoreError>;

    fn exists(&self, user_id: &str) -> Result<bool, StoreError>;

    /// Returns `false` when there was nothing to delete.
    fn delete(&self, user_id: &str) -> Result<bool, StoreError>;

    fn list(&self) -> Result<Vec<EnrollmentInfo>, StoreError>;
}
