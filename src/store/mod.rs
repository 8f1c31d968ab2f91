pub mod files;
pub mod memory;
pub mod sqlite;

use crate::errors::{AppError, AppResult};
use crate::record::{collection_schema, Record};
use crate::structured::validate_against_schema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

pub use files::FileStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// String key-value storage with whole-value overwrite semantics.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> AppResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> AppResult<()>;
    fn remove(&self, key: &str) -> AppResult<bool>;
    fn keys(&self) -> AppResult<Vec<String>>;
}

/// Outcome of reading a persisted value. Reads never fail: anything that
/// cannot be used resolves to the caller's default, tagged with the reason.
#[derive(Debug, Clone, PartialEq)]
pub enum Loaded<T> {
    Stored(T),
    Missing(T),
    Fallback { value: T, reason: String },
}

impl<T> Loaded<T> {
    pub fn value(&self) -> &T {
        match self {
            Loaded::Stored(value) | Loaded::Missing(value) => value,
            Loaded::Fallback { value, .. } => value,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Loaded::Stored(value) | Loaded::Missing(value) => value,
            Loaded::Fallback { value, .. } => value,
        }
    }

    pub fn is_stored(&self) -> bool {
        matches!(self, Loaded::Stored(_))
    }

    pub fn fallback_reason(&self) -> Option<&str> {
        match self {
            Loaded::Fallback { reason, .. } => Some(reason.as_str()),
            _ => None,
        }
    }
}

/// JSON persistence over a [`KeyValueStore`] backend.
#[derive(Clone)]
pub struct PersistentStore {
    backend: Arc<dyn KeyValueStore>,
}

impl PersistentStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn backend(&self) -> &Arc<dyn KeyValueStore> {
        &self.backend
    }

    pub fn load_value<T, F>(&self, key: &str, schema: Option<&Value>, default: F) -> Loaded<T>
    where
        T: DeserializeOwned,
        F: FnOnce() -> T,
    {
        let raw = match self.backend.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!(key = %key, "no persisted value, using default");
                return Loaded::Missing(default());
            }
            Err(error) => return fallback(key, error.to_string(), default),
        };

        let parsed: Value = match serde_json::from_str(&raw) {
            Ok(parsed) => parsed,
            Err(error) => return fallback(key, format!("invalid JSON: {}", error), default),
        };

        if let Some(schema) = schema {
            if let Err(errors) = validate_against_schema(&parsed, schema) {
                let reason = errors
                    .first()
                    .cloned()
                    .unwrap_or_else(|| "schema mismatch".to_string());
                return fallback(key, format!("schema mismatch: {}", reason), default);
            }
        }

        match serde_json::from_value(parsed) {
            Ok(value) => Loaded::Stored(value),
            Err(error) => fallback(key, format!("unexpected shape: {}", error), default),
        }
    }

    pub fn load_collection<R, F>(&self, key: &str, default: F) -> Loaded<Vec<R>>
    where
        R: Record,
        F: FnOnce() -> Vec<R>,
    {
        let schema = collection_schema::<R>();
        let mut default = Some(default);
        let loaded = self.load_value(key, Some(&schema), || {
            default.take().map(|build| build()).unwrap_or_default()
        });

        if let Loaded::Stored(records) = &loaded {
            let mut seen = HashSet::with_capacity(records.len());
            if let Some(duplicate) = records.iter().find(|record| !seen.insert(record.id())) {
                let reason = format!("duplicate id '{}'", duplicate.id());
                let value = default.take().map(|build| build()).unwrap_or_default();
                return fallback(key, reason, || value);
            }
        }
        loaded
    }

    /// Serializes and overwrites the key's prior value.
    pub fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> AppResult<()> {
        let raw = serde_json::to_string(value)?;
        self.backend.set(key, &raw)
    }

    pub fn remove(&self, key: &str) -> AppResult<bool> {
        self.backend.remove(key)
    }
}

fn fallback<T, F: FnOnce() -> T>(key: &str, reason: String, default: F) -> Loaded<T> {
    tracing::warn!(key = %key, reason = %reason, "persisted value unusable, falling back to default");
    Loaded::Fallback {
        value: default(),
        reason,
    }
}

pub(crate) fn enforce_quota(quota_bytes: Option<u64>, other_bytes: u64, key: &str, value: &str) -> AppResult<()> {
    let Some(quota) = quota_bytes else {
        return Ok(());
    };
    let needed = other_bytes + key.len() as u64 + value.len() as u64;
    if needed > quota {
        return Err(AppError::QuotaExceeded(format!(
            "writing '{}' needs {} bytes, quota is {}",
            key, needed, quota
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{KeyValueStore, Loaded, MemoryStore, PersistentStore};
    use crate::models::{AssetKind, Investment, InvestmentDraft, Task, TaskDraft};
    use crate::record::Record;
    use chrono::{NaiveDate, Utc};
    use std::sync::Arc;

    fn task(id: &str, text: &str) -> Task {
        Task::build(id.to_string(), Utc::now(), TaskDraft::new(text))
    }

    #[test]
    fn missing_key_yields_default() {
        let store = PersistentStore::in_memory();
        let loaded = store.load_collection::<Task, _>("tasks", Vec::new);
        assert!(matches!(loaded, Loaded::Missing(ref items) if items.is_empty()));
    }

    #[test]
    fn save_then_load_round_trips() {
        let store = PersistentStore::in_memory();
        let items = vec![task("task_a", "Buy milk"), task("task_b", "Walk dog")];
        store.save("tasks", &items).expect("save");

        let loaded = store.load_collection::<Task, _>("tasks", Vec::new);
        assert!(loaded.is_stored());
        assert_eq!(loaded.into_inner(), items);
    }

    #[test]
    fn float_fields_load_back_bit_for_bit() {
        let store = PersistentStore::in_memory();
        let draft = InvestmentDraft {
            symbol: "ACME".to_string(),
            name: "Acme".to_string(),
            kind: AssetKind::Fund,
            shares: 9953.789980209001,
            purchase_price: 0.1 + 0.2,
            current_price: Some(1.0e-7),
            purchase_date: NaiveDate::from_ymd_opt(2026, 1, 2).expect("date"),
            notes: None,
        };
        let items = vec![Investment::build("inv_a".to_string(), Utc::now(), draft)];
        store.save("inv", &items).expect("save");

        let loaded = store.load_collection::<Investment, _>("inv", Vec::new);
        assert!(loaded.is_stored());
        let loaded = loaded.into_inner();
        assert_eq!(loaded, items);
        assert_eq!(loaded[0].shares.to_bits(), 9953.789980209001_f64.to_bits());
    }

    #[test]
    fn corrupt_json_falls_back() {
        let backend = Arc::new(MemoryStore::new());
        backend.set("tasks", "[{not json").expect("set");
        let store = PersistentStore::new(backend);

        let loaded = store.load_collection::<Task, _>("tasks", || vec![task("seed", "Seed")]);
        assert!(loaded.fallback_reason().unwrap_or_default().contains("invalid JSON"));
        assert_eq!(loaded.value().len(), 1);
    }

    #[test]
    fn wrong_shape_falls_back() {
        let backend = Arc::new(MemoryStore::new());
        backend.set("tasks", r#"{"id": "x"}"#).expect("set");
        backend.set("other", r#"[{"id": 3, "text": "x"}]"#).expect("set");
        let store = PersistentStore::new(backend);

        let object = store.load_collection::<Task, _>("tasks", Vec::new);
        assert!(object.fallback_reason().unwrap_or_default().contains("schema mismatch"));
        let bad_item = store.load_collection::<Task, _>("other", Vec::new);
        assert!(bad_item.fallback_reason().is_some());
    }

    #[test]
    fn duplicate_ids_fall_back() {
        let store = PersistentStore::in_memory();
        store
            .save("tasks", &vec![task("same", "A"), task("same", "B")])
            .expect("save");

        let loaded = store.load_collection::<Task, _>("tasks", Vec::new);
        assert!(loaded.fallback_reason().unwrap_or_default().contains("duplicate id"));
        assert!(loaded.value().is_empty());
    }

    #[test]
    fn save_overwrites_previous_value() {
        let store = PersistentStore::in_memory();
        store.save("tasks", &vec![task("a", "A"), task("b", "B")]).expect("first");
        store.save("tasks", &vec![task("c", "C")]).expect("second");

        let loaded = store.load_collection::<Task, _>("tasks", Vec::new).into_inner();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "c");
    }
}
