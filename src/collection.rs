use crate::record::{new_record_id, FieldErrors, InsertAt, Record};
use crate::store::{Loaded, PersistentStore};
use crate::view::{derive_view, ViewQuery};
use chrono::Utc;
use std::sync::Arc;

/// Result of a batch insert: accepted records plus the index and errors of
/// every rejected draft.
#[derive(Debug, Clone)]
pub struct BatchOutcome<R> {
    pub added: Vec<R>,
    pub rejected: Vec<(usize, FieldErrors)>,
}

/// Owns one persisted collection and every mutation of it.
///
/// Each mutation builds a fresh `Vec` (records are cloned, never shared with
/// the previous snapshot), swaps it in and writes it through the store.
/// Persistence failures are kept as a dismissible message; the in-memory
/// collection still reflects the mutation. Id-based operations on unknown ids
/// are no-ops.
///
/// The "currently editing" reference is cleared whenever its record leaves
/// the collection.
pub struct CollectionController<R: Record> {
    key: String,
    store: PersistentStore,
    records: Arc<Vec<R>>,
    editing: Option<String>,
    persist_error: Option<String>,
    field_errors: Option<FieldErrors>,
}

impl<R: Record> CollectionController<R> {
    pub fn open(store: PersistentStore, key: &str) -> Self {
        let loaded = store.load_collection::<R, _>(key, seed_records::<R>);
        if let Loaded::Fallback { reason, .. } = &loaded {
            tracing::info!(kind = R::KIND, key = %key, reason = %reason, "collection reset to defaults");
        }
        Self {
            key: key.to_string(),
            store,
            records: Arc::new(loaded.into_inner()),
            editing: None,
            persist_error: None,
            field_errors: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }

    /// Cheap handle on the current array; later mutations never touch it.
    pub fn snapshot(&self) -> Arc<Vec<R>> {
        Arc::clone(&self.records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&R> {
        self.records.iter().find(|record| record.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn view(&self, query: &ViewQuery<R::Filter>) -> Vec<R> {
        derive_view(&self.records, query)
    }

    pub fn add(&mut self, draft: R::Draft) -> Result<R, FieldErrors> {
        let now = Utc::now();
        let record = R::build(self.fresh_id(now, &[]), now, draft);
        if let Err(errors) = record.validate() {
            tracing::debug!(kind = R::KIND, errors = %errors, "rejected new record");
            self.field_errors = Some(errors.clone());
            return Err(errors);
        }

        let mut next = Vec::with_capacity(self.records.len() + 1);
        match R::INSERT_AT {
            InsertAt::Front => {
                next.push(record.clone());
                next.extend(self.records.iter().cloned());
            }
            InsertAt::Back => {
                next.extend(self.records.iter().cloned());
                next.push(record.clone());
            }
        }
        self.field_errors = None;
        self.commit(next);
        Ok(record)
    }

    /// Validates every draft, inserts the valid ones in input order and
    /// persists once.
    pub fn add_many(&mut self, drafts: Vec<R::Draft>) -> BatchOutcome<R> {
        let now = Utc::now();
        let mut added: Vec<R> = Vec::new();
        let mut rejected = Vec::new();

        for (index, draft) in drafts.into_iter().enumerate() {
            let record = R::build(self.fresh_id(now, &added), now, draft);
            match record.validate() {
                Ok(()) => added.push(record),
                Err(errors) => rejected.push((index, errors)),
            }
        }

        if !added.is_empty() {
            let mut next = Vec::with_capacity(self.records.len() + added.len());
            match R::INSERT_AT {
                InsertAt::Front => {
                    next.extend(added.iter().rev().cloned());
                    next.extend(self.records.iter().cloned());
                }
                InsertAt::Back => {
                    next.extend(self.records.iter().cloned());
                    next.extend(added.iter().cloned());
                }
            }
            self.commit(next);
        }

        BatchOutcome { added, rejected }
    }

    /// Replaces the record with a merged copy. `Ok(false)` when `id` is unknown.
    pub fn update(&mut self, id: &str, patch: &R::Patch) -> Result<bool, FieldErrors> {
        let Some(current) = self.get(id) else {
            return Ok(false);
        };
        let updated = current.patched(patch);
        if let Err(errors) = updated.validate() {
            self.field_errors = Some(errors.clone());
            return Err(errors);
        }

        self.field_errors = None;
        self.replace(updated);
        Ok(true)
    }

    /// Flips `flag` on the record. `None` when the id or the flag is unknown.
    pub fn toggle_flag(&mut self, id: &str, flag: &str) -> Option<R> {
        let toggled = self.get(id)?.toggled(flag, Utc::now())?;
        self.replace(toggled.clone());
        Some(toggled)
    }

    pub fn remove(&mut self, id: &str) -> bool {
        if !self.contains(id) {
            return false;
        }
        let next = self
            .records
            .iter()
            .filter(|record| record.id() != id)
            .cloned()
            .collect();
        self.commit(next);
        true
    }

    pub fn remove_where<P>(&mut self, predicate: P) -> usize
    where
        P: Fn(&R) -> bool,
    {
        let next: Vec<R> = self
            .records
            .iter()
            .filter(|record| !predicate(record))
            .cloned()
            .collect();
        let removed = self.records.len() - next.len();
        if removed > 0 {
            self.commit(next);
        }
        removed
    }

    pub fn clear(&mut self) {
        self.commit(Vec::new());
    }

    /// Starts editing `id`. Ignored for ids not in the collection.
    pub fn begin_edit(&mut self, id: &str) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.editing = Some(id.to_string());
        true
    }

    pub fn cancel_edit(&mut self) {
        self.editing = None;
    }

    pub fn editing_id(&self) -> Option<&str> {
        self.editing.as_deref()
    }

    pub fn editing(&self) -> Option<&R> {
        self.editing.as_deref().and_then(|id| self.get(id))
    }

    pub fn persist_error(&self) -> Option<&str> {
        self.persist_error.as_deref()
    }

    pub fn field_errors(&self) -> Option<&FieldErrors> {
        self.field_errors.as_ref()
    }

    pub fn dismiss_errors(&mut self) {
        self.persist_error = None;
        self.field_errors = None;
    }

    fn replace(&mut self, updated: R) {
        let next = self
            .records
            .iter()
            .map(|record| {
                if record.id() == updated.id() {
                    updated.clone()
                } else {
                    record.clone()
                }
            })
            .collect();
        self.commit(next);
    }

    fn commit(&mut self, next: Vec<R>) {
        self.records = Arc::new(next);

        let dangling = self
            .editing
            .as_deref()
            .is_some_and(|id| !self.records.iter().any(|record| record.id() == id));
        if dangling {
            self.editing = None;
        }

        match self.store.save(&self.key, self.records.as_slice()) {
            Ok(()) => self.persist_error = None,
            Err(error) => {
                tracing::warn!(kind = R::KIND, key = %self.key, error = %error, "failed to persist collection");
                self.persist_error = Some(error.to_string());
            }
        }
    }

    fn fresh_id(&self, now: chrono::DateTime<Utc>, pending: &[R]) -> String {
        loop {
            let id = new_record_id(R::KIND, now);
            let taken = self.contains(&id) || pending.iter().any(|record| record.id() == id);
            if !taken {
                return id;
            }
        }
    }
}

fn seed_records<R: Record>() -> Vec<R> {
    let now = Utc::now();
    R::seed()
        .into_iter()
        .map(|draft| R::build(new_record_id(R::KIND, now), now, draft))
        .collect()
}
