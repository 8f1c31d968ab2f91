use super::{enforce_quota, KeyValueStore};
use crate::errors::{AppError, AppResult};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Process-local store. Used by tests and the `memory` backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
    quota_bytes: Option<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: u64) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| AppError::Internal("memory store lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| AppError::Internal("memory store lock poisoned".to_string()))?;
        let other_bytes: u64 = entries
            .iter()
            .filter(|(existing, _)| existing.as_str() != key)
            .map(|(existing, stored)| (existing.len() + stored.len()) as u64)
            .sum();
        enforce_quota(self.quota_bytes, other_bytes, key, value)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> AppResult<bool> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| AppError::Internal("memory store lock poisoned".to_string()))?;
        Ok(entries.remove(key).is_some())
    }

    fn keys(&self) -> AppResult<Vec<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| AppError::Internal("memory store lock poisoned".to_string()))?;
        Ok(entries.keys().cloned().collect())
    }
}
