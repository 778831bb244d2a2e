//! Directory-backed store: one record file per enrolled user.

use super::{codec, FeatureStore, StoreError};
use crate::types::{EnrollmentInfo, FeatureVector};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const FILE_PREFIX: &str = "user_";
const FILE_EXTENSION: &str = "fcfv";

/// Stores each vector in `<dir>/user_<hex(user_id)>.fcfv`.
///
/// Writes go to a temporary file in the same directory and are renamed over
/// the target, so readers never observe a partial record. Writers for the
/// same user are serialized.
pub struct FileFeatureStore {
    dir: PathBuf,
    write_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FileFeatureStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        tracing::info!(path = %dir.display(), "opened file feature store");
        Ok(Self {
            dir,
            write_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, user_id: &str) -> PathBuf {
        self.dir.join(record_file_name(user_id))
    }

    /// Run `write` while holding `user_id`'s write lock.
    ///
    /// The lock entry is dropped afterwards unless another writer is queued on
    /// it, so the map only holds users with writes in flight.
    fn with_user_lock<T>(
        &self,
        user_id: &str,
        write: impl FnOnce() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let lock = {
            let mut locks = self.write_locks.lock().map_err(|_| StoreError::Poisoned)?;
            locks
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        let result = {
            let _guard = lock.lock().map_err(|_| StoreError::Poisoned)?;
            write()
        };

        let mut locks = self.write_locks.lock().map_err(|_| StoreError::Poisoned)?;
        // One reference in the map, one here: nobody else is waiting.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(user_id);
        }
        result
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.write_locks.lock().map(|l| l.len()).unwrap_or(0)
    }
}

impl FeatureStore for FileFeatureStore {
    fn save(&self, user_id: &str, vector: &FeatureVector) -> Result<(), StoreError> {
        self.with_user_lock(user_id, || {
            let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
            tmp.write_all(&codec::encode(vector))?;
            tmp.as_file().sync_all()?;
            tmp.persist(self.record_path(user_id)).map_err(|e| e.error)?;
            Ok(())
        })?;

        tracing::debug!(user_id, dim = vector.len(), "saved enrollment record");
        Ok(())
    }

    fn load(&self, user_id: &str) -> Result<Option<FeatureVector>, StoreError> {
        match std::fs::read(self.record_path(user_id)) {
            Ok(bytes) => codec::decode(user_id, &bytes).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, user_id: &str) -> Result<bool, StoreError> {
        Ok(self.record_path(user_id).try_exists()?)
    }

    fn delete(&self, user_id: &str) -> Result<bool, StoreError> {
        self.with_user_lock(user_id, || {
            match std::fs::remove_file(self.record_path(user_id)) {
                Ok(()) => {
                    tracing::debug!(user_id, "deleted enrollment record");
                    Ok(true)
                }
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn list(&self) -> Result<Vec<EnrollmentInfo>, StoreError> {
        let mut infos = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(user_id) = name.to_str().and_then(parse_record_file_name) else {
                continue;
            };

            let bytes = match std::fs::read(entry.path()) {
                Ok(bytes) => bytes,
                // Deleted between read_dir and read.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let vector = match codec::decode(&user_id, &bytes) {
                Ok(v) => v,
                Err(err) => {
                    tracing::warn!(user_id, error = %err, "skipping unreadable enrollment record");
                    continue;
                }
            };
            let enrolled_at = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .map(DateTime::<Utc>::from);

            infos.push(EnrollmentInfo {
                user_id,
                dimension: vector.len(),
                enrolled_at,
            });
        }
        infos.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(infos)
    }
}

/// `user_<lowercase hex of the UTF-8 id>.fcfv`, safe for any identifier.
fn record_file_name(user_id: &str) -> String {
    format!("{FILE_PREFIX}{}.{FILE_EXTENSION}", hex::encode(user_id))
}

fn parse_record_file_name(name: &str) -> Option<String> {
    let encoded = name
        .strip_prefix(FILE_PREFIX)?
        .strip_suffix(FILE_EXTENSION)?
        .strip_suffix('.')?;
    String::from_utf8(hex::decode(encoded).ok()?).ok()
}
