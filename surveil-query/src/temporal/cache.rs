//! Parse cache for temporal values.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::{Temporal, TemporalKind};
use crate::error::QueryResult;

/// Memoises the parsing of server-supplied date strings.
///
/// Aggregated responses repeat the same handful of dates across many rows
/// (one per lineage, per country, ...). The cache maps each canonical string
/// to its parsed value so repeated strings are parsed once per session.
///
/// The cache is append-only: entries are never removed or replaced. Create
/// one at session start and share it by `Arc` with every query that parses
/// dates. [`Temporal`] is `Copy` with value semantics, so a cached value is
/// indistinguishable from a freshly parsed one.
///
/// # Example
///
/// ```rust
/// use surveil_query::temporal::{TemporalCache, TemporalKind};
///
/// let cache = TemporalCache::new();
/// let first = cache.parse(TemporalKind::Day, "2023-01-05").unwrap();
/// let second = cache.parse(TemporalKind::Day, "2023-01-05").unwrap();
/// assert_eq!(first, second);
/// assert_eq!(cache.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct TemporalCache {
    entries: RwLock<HashMap<String, Temporal>>,
}

impl TemporalCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `input` as a value of `kind`, reusing a cached result.
    ///
    /// Invalid input is never cached; it fails every time with
    /// [`QueryError::InvalidTemporalFormat`](crate::error::QueryError::InvalidTemporalFormat).
    pub fn parse(&self, kind: TemporalKind, input: &str) -> QueryResult<Temporal> {
        if let Some(value) = self.lookup(input) {
            if value.kind() == kind {
                return Ok(value);
            }
        }
        let value = Temporal::parse(kind, input)?;
        self.insert(input, value);
        Ok(value)
    }

    /// Parses `input`, detecting its kind from the canonical pattern.
    pub fn parse_any(&self, input: &str) -> QueryResult<Temporal> {
        if let Some(value) = self.lookup(input) {
            return Ok(value);
        }
        let value: Temporal = input.parse()?;
        self.insert(input, value);
        Ok(value)
    }

    /// Parses an optional date; a missing date is the unknown-date sentinel.
    pub fn parse_optional(
        &self,
        kind: TemporalKind,
        input: Option<&str>,
    ) -> QueryResult<Option<Temporal>> {
        input.map(|raw| self.parse(kind, raw)).transpose()
    }

    /// Number of distinct strings cached so far.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if nothing has been cached yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, input: &str) -> Option<Temporal> {
        // Entries are only ever inserted whole, so a poisoned lock still
        // guards a consistent map.
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(input)
            .copied()
    }

    fn insert(&self, input: &str, value: Temporal) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(input.to_string())
            .or_insert(value);
    }
}
