use crate::errors::{AppError, AppResult};
use crate::models::PageResponse;
use crate::record::{Record, SortValue};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.eq_ignore_ascii_case("asc") {
            Some(Self::Asc)
        } else if raw.eq_ignore_ascii_case("desc") {
            Some(Self::Desc)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortSpec {
    pub key: String,
    pub direction: SortDirection,
}

/// Inputs of the derived view: search term, categorical filter, sort.
#[derive(Debug, Clone, Default)]
pub struct ViewQuery<F> {
    pub search: String,
    pub filter: F,
    pub sort: Option<SortSpec>,
}

impl<F: Default> ViewQuery<F> {
    pub fn new() -> Self {
        Self {
            search: String::new(),
            filter: F::default(),
            sort: None,
        }
    }
}

impl<F> ViewQuery<F> {
    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = term.into();
        self
    }

    pub fn filter(mut self, filter: F) -> Self {
        self.filter = filter;
        self
    }

    pub fn sort_by(mut self, key: impl Into<String>, direction: SortDirection) -> Self {
        self.sort = Some(SortSpec {
            key: key.into(),
            direction,
        });
        self
    }
}

/// Filters (search AND categorical predicate), then stable-sorts a copy of
/// `records`. An unknown sort key keeps insertion order.
pub fn derive_view<R: Record>(records: &[R], query: &ViewQuery<R::Filter>) -> Vec<R> {
    let needle = query.search.trim().to_lowercase();
    let mut view: Vec<R> = records
        .iter()
        .filter(|record| matches_search(*record, &needle) && record.matches(&query.filter))
        .cloned()
        .collect();

    if let Some(sort) = query.sort.as_ref() {
        sort_records(&mut view, sort);
    }
    view
}

pub fn matches_search<R: Record>(record: &R, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    record
        .search_fields()
        .iter()
        .any(|field| field.to_lowercase().contains(needle))
}

pub fn sort_records<R: Record>(records: &mut [R], sort: &SortSpec) {
    records.sort_by(|a, b| {
        let ordering = compare_sort_values(a.sort_value(&sort.key), b.sort_value(&sort.key));
        match sort.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
}

fn compare_sort_values(a: Option<SortValue<'_>>, b: Option<SortValue<'_>>) -> Ordering {
    let (Some(a), Some(b)) = (a, b) else {
        return Ordering::Equal;
    };
    match (a, b) {
        (SortValue::Text(a), SortValue::Text(b)) => compare_text(a, b),
        (SortValue::Number(a), SortValue::Number(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (SortValue::Missing, SortValue::Missing) => Ordering::Equal,
        (SortValue::Missing, _) => Ordering::Greater,
        (_, SortValue::Missing) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

/// Case-insensitive collation; on a case-only difference lowercase sorts
/// first, the way a browser's default collator orders "a" before "A".
pub fn compare_text(a: &str, b: &str) -> Ordering {
    let folded_a = a.chars().flat_map(char::to_lowercase);
    let folded_b = b.chars().flat_map(char::to_lowercase);
    folded_a.cmp(folded_b).then_with(|| b.cmp(a))
}

pub fn paginate<T>(items: Vec<T>, limit: Option<u32>, cursor: Option<String>) -> AppResult<PageResponse<T>> {
    let total = items.len();
    let offset = parse_cursor(cursor)?;
    let page_size = limit.unwrap_or(100).clamp(1, 500) as usize;

    let mut iter = items.into_iter().skip(offset);
    let page_items: Vec<T> = (&mut iter).take(page_size).collect();
    let consumed = offset + page_items.len();
    let next_cursor = if consumed < total {
        Some(consumed.to_string())
    } else {
        None
    };

    Ok(PageResponse {
        items: page_items,
        next_cursor,
        total_approx: Some(total as u64),
    })
}

fn parse_cursor(cursor: Option<String>) -> AppResult<usize> {
    let Some(value) = cursor else {
        return Ok(0);
    };
    value
        .parse::<usize>()
        .map_err(|_| AppError::Validation(format!("Invalid cursor '{}': expected numeric offset", value)))
}
