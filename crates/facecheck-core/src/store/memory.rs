//! In-process store; nothing survives the process.

use super::{FeatureStore, StoreError};
use crate::types::{EnrollmentInfo, FeatureVector};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
pub struct MemoryFeatureStore {
    records: RwLock<HashMap<String, (FeatureVector, DateTime<Utc>)>>,
}

impl MemoryFeatureStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FeatureStore for MemoryFeatureStore {
    fn save(&self, user_id: &str, vector: &FeatureVector) -> Result<(), StoreError> {
        self.records
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .insert(user_id.to_string(), (vector.clone(), Utc::now()));
        Ok(())
    }

    fn load(&self, user_id: &str) -> Result<Option<FeatureVector>, StoreError> {
        Ok(self
            .records
            .read()
            .map_err(|_| StoreError::Poisoned)?
            .get(user_id)
            .map(|(v, _)| v.clone()))
    }

    fn exists(&self, user_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .records
            .read()
            .map_err(|_| StoreError::Poisoned)?
            .contains_key(user_id))
    }

    fn delete(&self, user_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .records
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .remove(user_id)
            .is_some())
    }

    fn list(&self) -> Result<Vec<EnrollmentInfo>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        let mut infos: Vec<EnrollmentInfo> = records
            .iter()
            .map(|(user_id, (v, at))| EnrollmentInfo {
                user_id: user_id.clone(),
                dimension: v.len(),
                enrolled_at: Some(*at),
            })
            .collect();
        infos.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(infos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crud() {
        let store = MemoryFeatureStore::new();
        let v = FeatureVector::new(vec![0.25, 0.5, 1.0]);

        assert!(!store.exists("u1").unwrap());
        store.save("u1", &v).unwrap();
        assert!(store.exists("u1").unwrap());
        assert_eq!(store.load("u1").unwrap(), Some(v));

        store.save("u1", &FeatureVector::new(vec![0.0; 3])).unwrap();
        assert_eq!(store.list().unwrap().len(), 1);

        assert!(store.delete("u1").unwrap());
        assert!(!store.delete("u1").unwrap());
        assert!(store.load("u1").unwrap().is_none());
    }
}
