use crate::errors::AppError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Where `add` places a new record. Fixed per record kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertAt {
    Front,
    Back,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Field-level validation failures, rendered next to the offending inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.0.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    pub fn require_text(&mut self, field: &str, value: &str) {
        if value.trim().is_empty() {
            self.push(field, "must not be empty");
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|error| error.field == field)
    }

    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .iter()
            .map(|error| format!("{}: {}", error.field, error.message))
            .collect::<Vec<_>>()
            .join("; ");
        f.write_str(&joined)
    }
}

impl From<FieldErrors> for AppError {
    fn from(value: FieldErrors) -> Self {
        AppError::Validation(value.to_string())
    }
}

/// A value a record exposes for ordering. Timestamps and dates are numeric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SortValue<'a> {
    Text(&'a str),
    Number(f64),
    Missing,
}

impl<'a> SortValue<'a> {
    pub fn time(value: DateTime<Utc>) -> Self {
        SortValue::Number(value.timestamp_millis() as f64)
    }

    pub fn optional_text(value: Option<&'a str>) -> Self {
        value.map(SortValue::Text).unwrap_or(SortValue::Missing)
    }
}

/// A flat, uniquely identified entity held in a collection.
///
/// Implementors describe how a record is built from a draft, how a patch is
/// merged into a copy, which text fields search looks at, how the categorical
/// filter applies, and what each sort key resolves to.
pub trait Record: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    type Draft: Clone + fmt::Debug;
    type Patch: Clone + fmt::Debug;
    type Filter: Clone + Default + fmt::Debug;

    /// Short lowercase tag used as the id prefix and in log fields.
    const KIND: &'static str;
    const INSERT_AT: InsertAt = InsertAt::Back;

    fn id(&self) -> &str;
    fn created_at(&self) -> DateTime<Utc>;

    fn build(id: String, created_at: DateTime<Utc>, draft: Self::Draft) -> Self;
    fn validate(&self) -> Result<(), FieldErrors>;
    fn patched(&self, patch: &Self::Patch) -> Self;

    fn search_fields(&self) -> Vec<&str>;
    fn matches(&self, filter: &Self::Filter) -> bool;

    /// `None` means the key is unknown for this record kind.
    fn sort_value(&self, key: &str) -> Option<SortValue<'_>>;

    /// Flips a named boolean flag. `None` when the kind has no such flag.
    fn toggled(&self, _flag: &str, _now: DateTime<Utc>) -> Option<Self> {
        None
    }

    /// JSON Schema of a single persisted record.
    fn schema() -> Value;

    /// Drafts seeded when nothing usable is persisted.
    fn seed() -> Vec<Self::Draft> {
        Vec::new()
    }
}

pub fn new_record_id(kind: &str, now: DateTime<Utc>) -> String {
    let short = Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}_{}",
        kind,
        now.format("%Y%m%d"),
        now.format("%H%M%S"),
        &short[..8]
    )
}

pub fn collection_schema<R: Record>() -> Value {
    serde_json::json!({
        "type": "array",
        "items": R::schema(),
    })
}
