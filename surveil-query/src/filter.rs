//! Request model for the aggregation endpoint.
//!
//! A request body is a flat JSON object: filter field/value pairs next to a
//! few reserved keys (`fields`, `limit`, `offset`, `orderBy`). Date ranges use
//! the `<dateField>From` / `<dateField>To` convention.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{QueryError, QueryResult};
use crate::temporal::Temporal;

/// Keys that the aggregation endpoint interprets itself and that must not
/// appear as filter fields.
pub const RESERVED_KEYS: &[&str] = &["fields", "limit", "offset", "orderBy", "minProportion"];

/// A filter value: scalar, list of strings, or null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Null,
    Bool(bool),
    Integer(i64),
    Number(f64),
    Text(String),
    TextList(Vec<String>),
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Text(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Bool(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Integer(value)
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        FilterValue::Number(value)
    }
}

impl From<Vec<String>> for FilterValue {
    fn from(values: Vec<String>) -> Self {
        FilterValue::TextList(values)
    }
}

impl From<Vec<&str>> for FilterValue {
    fn from(values: Vec<&str>) -> Self {
        FilterValue::TextList(values.into_iter().map(String::from).collect())
    }
}

impl<T: Into<FilterValue>> From<Option<T>> for FilterValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(FilterValue::Null, Into::into)
    }
}

/// A mapping from field name to the value records must match.
///
/// # Example
///
/// ```rust
/// use surveil_query::filter::QueryFilter;
/// use surveil_query::temporal::Temporal;
///
/// let filter = QueryFilter::new()
///     .with("country", "Switzerland")
///     .with_date_range(
///         "date",
///         Some(Temporal::month(2023, 1).unwrap()),
///         Some(Temporal::month(2023, 2).unwrap()),
///     );
///
/// let json = serde_json::to_value(&filter).unwrap();
/// assert_eq!(json["dateFrom"], "2023-01-01");
/// assert_eq!(json["dateTo"], "2023-02-28");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryFilter {
    fields: BTreeMap<String, FilterValue>,
}

impl QueryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a field.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<FilterValue>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&FilterValue> {
        self.fields.get(field)
    }

    pub fn remove(&mut self, field: &str) -> Option<FilterValue> {
        self.fields.remove(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FilterValue)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Restricts `date_field` to the days covered by `from` through `to`.
    ///
    /// `from` contributes its first day as `<date_field>From`, `to` its last
    /// day as `<date_field>To`. A missing bound leaves that side open.
    pub fn with_date_range(
        mut self,
        date_field: &str,
        from: Option<Temporal>,
        to: Option<Temporal>,
    ) -> Self {
        if let Some(from) = from {
            self.insert(
                format!("{date_field}From"),
                from.first_day().format("%Y-%m-%d").to_string(),
            );
        }
        if let Some(to) = to {
            self.insert(
                format!("{date_field}To"),
                to.last_day().format("%Y-%m-%d").to_string(),
            );
        }
        self
    }

    /// Returns a copy with every field of `other` layered on top.
    pub fn merged(&self, other: &QueryFilter) -> Self {
        let mut merged = self.clone();
        for (field, value) in other.iter() {
            merged.insert(field.clone(), value.clone());
        }
        merged
    }

    /// Fails if the filter uses a key the endpoint reserves for itself.
    pub fn validate(&self) -> QueryResult<()> {
        match self.fields.keys().find(|key| RESERVED_KEYS.contains(&key.as_str())) {
            Some(key) => Err(QueryError::invalid_request(format!(
                "'{key}' is reserved and cannot be used as a filter field"
            ))),
            None => Ok(()),
        }
    }
}

/// Sort direction of an `orderBy` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    Ascending,
    Descending,
}

/// One `orderBy` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    #[serde(rename = "type")]
    pub direction: OrderDirection,
}

impl OrderBy {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Ascending,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Descending,
        }
    }
}

/// Paging and ordering options shared by the row-returning endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Paging {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    #[serde(rename = "orderBy", skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<OrderBy>,
}

/// Body of `POST <base>/aggregated` and `POST <base>/details`.
#[derive(Debug, Serialize)]
pub struct FieldsRequest<'a> {
    #[serde(flatten)]
    pub filter: &'a QueryFilter,
    pub fields: &'a [String],
    #[serde(flatten)]
    pub paging: &'a Paging,
}

/// A single cell of a response row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(value) => Some(*value as f64),
            FieldValue::Number(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("null"),
            FieldValue::Bool(value) => write!(f, "{value}"),
            FieldValue::Integer(value) => write!(f, "{value}"),
            FieldValue::Number(value) => write!(f, "{value}"),
            FieldValue::Text(value) => f.write_str(value),
        }
    }
}
