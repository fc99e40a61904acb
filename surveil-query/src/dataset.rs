//! The result of evaluating an operator.

use serde::{Deserialize, Serialize};

/// An ordered, immutable sequence of rows produced by one evaluation.
///
/// A dataset carries no provenance beyond its rows. Combinators consume a
/// dataset and build a new one; nothing mutates a dataset in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dataset<T> {
    rows: Vec<T>,
}

impl<T> Dataset<T> {
    pub fn new(rows: Vec<T>) -> Self {
        Self { rows }
    }

    pub fn empty() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn rows(&self) -> &[T] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<T> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.rows.iter()
    }

    pub fn first(&self) -> Option<&T> {
        self.rows.first()
    }
}

impl<T> Default for Dataset<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> From<Vec<T>> for Dataset<T> {
    fn from(rows: Vec<T>) -> Self {
        Self::new(rows)
    }
}

impl<T> FromIterator<T> for Dataset<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<T> IntoIterator for Dataset<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a Dataset<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_preserves_order() {
        let dataset: Dataset<u32> = vec![3, 1, 2].into_iter().collect();
        assert_eq!(dataset.rows(), &[3, 1, 2]);
        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.first(), Some(&3));
        assert_eq!(dataset.into_rows(), vec![3, 1, 2]);
    }

    #[test]
    fn test_dataset_serializes_as_array() {
        let dataset = Dataset::new(vec!["a", "b"]);
        assert_eq!(serde_json::to_string(&dataset).unwrap(), r#"["a","b"]"#);
        assert!(Dataset::<u8>::default().is_empty());
    }
}
