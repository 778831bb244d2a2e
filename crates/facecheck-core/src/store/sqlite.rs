//! SQLite-backed store.

use super::{codec, FeatureStore, StoreError};
use crate::types::{EnrollmentInfo, FeatureVector};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS enrollments (
    user_id     TEXT PRIMARY KEY NOT NULL,
    dimension   INTEGER NOT NULL,
    features    BLOB NOT NULL,
    enrolled_at TEXT NOT NULL
);
";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Stores each vector as an encoded blob in an `enrollments` table.
///
/// The single upsert statement is atomic, and the connection mutex
/// serializes all writers.
pub struct SqliteFeatureStore {
    conn: Mutex<Connection>,
}

impl SqliteFeatureStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        tracing::info!(path = %path.display(), "opened sqlite feature store");
        Self::with_connection(conn)
    }

    /// Non-persistent database, mainly for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl FeatureStore for SqliteFeatureStore {
    fn save(&self, user_id: &str, vector: &FeatureVector) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO enrollments (user_id, dimension, features, enrolled_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
                 dimension = excluded.dimension,
                 features = excluded.features,
                 enrolled_at = excluded.enrolled_at",
            params![
                user_id,
                vector.len() as i64,
                codec::encode(vector),
                Utc::now().to_rfc3339(),
            ],
        )?;
        tracing::debug!(user_id, dim = vector.len(), "saved enrollment row");
        Ok(())
    }

    fn load(&self, user_id: &str) -> Result<Option<FeatureVector>, StoreError> {
        let blob: Option<Vec<u8>> = self
            .conn()?
            .query_row(
                "SELECT features FROM enrollments WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;

        blob.map(|bytes| codec::decode(user_id, &bytes)).transpose()
    }

    fn exists(&self, user_id: &str) -> Result<bool, StoreError> {
        let found: Option<i64> = self
            .conn()?
            .query_row(
                "SELECT 1 FROM enrollments WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn delete(&self, user_id: &str) -> Result<bool, StoreError> {
        let removed = self
            .conn()?
            .execute("DELETE FROM enrollments WHERE user_id = ?1", params![user_id])?;
        Ok(removed > 0)
    }

    fn list(&self) -> Result<Vec<EnrollmentInfo>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, dimension, enrolled_at FROM enrollments ORDER BY user_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut infos = Vec::new();
        for row in rows {
            let (user_id, dimension, enrolled_at) = row?;
            infos.push(EnrollmentInfo {
                user_id,
                dimension: dimension.max(0) as usize,
                enrolled_at: DateTime::parse_from_rfc3339(&enrolled_at)
                    .ok()
                    .map(|t| t.with_timezone(&Utc)),
            });
        }
        Ok(infos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn vector(seed: u32, len: usize) -> FeatureVector {
        FeatureVector::new(
            (0..len)
                .map(|i| ((i as u32 * 13 + seed * 7) % 256) as f64 / 255.0)
                .collect(),
        )
    }

    #[test]
    fn test_save_load_roundtrip() {
        let store = SqliteFeatureStore::open_in_memory().unwrap();
        let v = vector(3, 16384);
        store.save("u1", &v).unwrap();

        let loaded = store.load("u1").unwrap().unwrap();
        assert!(loaded
            .values
            .iter()
            .zip(v.values.iter())
            .all(|(a, b)| a.to_bits() == b.to_bits()));
    }

    #[test]
    fn test_missing_user() {
        let store = SqliteFeatureStore::open_in_memory().unwrap();
        assert!(store.load("nobody").unwrap().is_none());
        assert!(!store.exists("nobody").unwrap());
        assert!(!store.delete("nobody").unwrap());
    }

    #[test]
    fn test_upsert_replaces() {
        let store = SqliteFeatureStore::open_in_memory().unwrap();
        store.save("u1", &vector(1, 32)).unwrap();
        store.save("u1", &vector(2, 64)).unwrap();

        assert_eq!(store.load("u1").unwrap().unwrap(), vector(2, 64));
        let infos = store.list().unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].dimension, 64);
        assert!(infos[0].enrolled_at.is_some());
    }

    #[test]
    fn test_delete_then_exists() {
        let store = SqliteFeatureStore::open_in_memory().unwrap();
        store.save("u1", &vector(1, 8)).unwrap();
        assert!(store.exists("u1").unwrap());
        assert!(store.delete("u1").unwrap());
        assert!(!store.exists("u1").unwrap());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("faces.db");
        {
            let store = SqliteFeatureStore::open(&path).unwrap();
            store.save("u9", &vector(9, 128)).unwrap();
        }
        let store = SqliteFeatureStore::open(&path).unwrap();
        assert_eq!(store.load("u9").unwrap().unwrap(), vector(9, 128));
    }

    #[test]
    fn test_corrupt_blob_is_error() {
        let store = SqliteFeatureStore::open_in_memory().unwrap();
        store
            .conn()
            .unwrap()
            .execute(
                "INSERT INTO enrollments VALUES ('bad', 4, x'00010203', '2026-01-01T00:00:00Z')",
                [],
            )
            .unwrap();
        assert!(matches!(store.load("bad"), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_concurrent_saves() {
        let store = Arc::new(SqliteFeatureStore::open_in_memory().unwrap());
        let handles: Vec<_> = (0..4u32)
            .map(|seed| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..5 {
                        store.save("shared", &vector(seed, 1024)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let last = store.load("shared").unwrap().unwrap();
        assert!((0..4).any(|seed| vector(seed, 1024) == last));
    }
}
