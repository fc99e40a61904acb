//! Sparse two-axis matrix with insertion-ordered axes.
//!
//! [`Map2D`] stores values addressed by a row key and a column key, typically
//! a category and a time bucket. Both axes remember the order in which their
//! keys were first seen. A cell that was never set is absent, which is
//! different from any stored value including zero or `None`.
//!
//! ```rust
//! use surveil_query::map2d::Map2D;
//!
//! let mut grid: Map2D<&str, &str, u64> = Map2D::new();
//! grid.set("BA.2", "2023-01", 0);
//!
//! assert_eq!(grid.get(&"BA.2", &"2023-01"), Some(&0));
//! assert_eq!(grid.get(&"BA.2", &"2023-02"), None);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;

use crate::error::{QueryError, QueryResult};
use crate::temporal::Temporal;

/// Insertion-ordered set of axis keys.
#[derive(Debug, Clone)]
struct KeyRegistry<K> {
    keys: Vec<K>,
    positions: HashMap<K, usize>,
}

impl<K> Default for KeyRegistry<K> {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            positions: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyRegistry<K> {
    fn register(&mut self, key: &K) {
        if !self.positions.contains_key(key) {
            self.positions.insert(key.clone(), self.keys.len());
            self.keys.push(key.clone());
        }
    }

    fn contains(&self, key: &K) -> bool {
        self.positions.contains_key(key)
    }

    fn remove(&mut self, key: &K) {
        if let Some(position) = self.positions.remove(key) {
            self.keys.remove(position);
            for later in &self.keys[position..] {
                if let Some(slot) = self.positions.get_mut(later) {
                    *slot -= 1;
                }
            }
        }
    }
}

/// A sparse matrix of `V` addressed by `(R, C)`.
#[derive(Debug, Clone)]
pub struct Map2D<R, C = Temporal, V = u64> {
    rows: KeyRegistry<R>,
    columns: KeyRegistry<C>,
    cells: HashMap<R, HashMap<C, V>>,
}

impl<R, C, V> Default for Map2D<R, C, V> {
    fn default() -> Self {
        Self {
            rows: KeyRegistry::default(),
            columns: KeyRegistry::default(),
            cells: HashMap::new(),
        }
    }
}

impl<R, C, V> Map2D<R, C, V>
where
    R: Eq + Hash + Clone,
    C: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value`, registering either key that is new.
    pub fn set(&mut self, row: R, column: C, value: V) {
        self.rows.register(&row);
        self.columns.register(&column);
        self.cells.entry(row).or_default().insert(column, value);
    }

    /// The stored value, or `None` if the cell was never set.
    pub fn get(&self, row: &R, column: &C) -> Option<&V> {
        self.cells.get(row).and_then(|cells| cells.get(column))
    }

    pub fn get_mut(&mut self, row: &R, column: &C) -> Option<&mut V> {
        self.cells.get_mut(row).and_then(|cells| cells.get_mut(column))
    }

    pub fn contains(&self, row: &R, column: &C) -> bool {
        self.get(row, column).is_some()
    }

    /// Registers a row key without setting any cell.
    ///
    /// Useful to impose a display order before values arrive.
    pub fn add_row_key(&mut self, row: R) {
        self.rows.register(&row);
    }

    /// Registers a column key without setting any cell.
    pub fn add_column_key(&mut self, column: C) {
        self.columns.register(&column);
    }

    /// One row in column order; unset cells are `None`.
    pub fn get_row(&self, row: &R) -> Vec<Option<&V>> {
        let cells = self.cells.get(row);
        self.columns
            .keys
            .iter()
            .map(|column| cells.and_then(|cells| cells.get(column)))
            .collect()
    }

    /// One row in column order with `default` substituted for unset cells.
    pub fn get_row_or(&self, row: &R, default: V) -> Vec<V>
    where
        V: Clone,
    {
        self.get_row(row)
            .into_iter()
            .map(|value| value.cloned().unwrap_or_else(|| default.clone()))
            .collect()
    }

    /// Removes a row key and all of its cells.
    ///
    /// Column keys stay registered even if no cell refers to them anymore.
    pub fn remove_row(&mut self, row: &R) -> Option<HashMap<C, V>> {
        self.rows.remove(row);
        self.cells.remove(row)
    }

    /// Dense matrix in row then column insertion order; unset cells are `None`.
    pub fn get_as_array(&self) -> Vec<Vec<Option<&V>>> {
        self.rows.keys.iter().map(|row| self.get_row(row)).collect()
    }

    /// Dense matrix with `default` substituted for unset cells.
    pub fn get_as_array_or(&self, default: V) -> Vec<Vec<V>>
    where
        V: Clone,
    {
        self.rows
            .keys
            .iter()
            .map(|row| self.get_row_or(row, default.clone()))
            .collect()
    }

    /// Row keys in insertion order.
    pub fn first_axis_keys(&self) -> &[R] {
        &self.rows.keys
    }

    /// Column keys in insertion order.
    pub fn second_axis_keys(&self) -> &[C] {
        &self.columns.keys
    }

    pub fn has_row(&self, row: &R) -> bool {
        self.rows.contains(row)
    }

    pub fn has_column(&self, column: &C) -> bool {
        self.columns.contains(column)
    }

    /// Number of stored cells.
    pub fn len(&self) -> usize {
        self.cells.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored cells in row then column insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&R, &C, &V)> + '_ {
        self.rows.keys.iter().flat_map(move |row| {
            let cells = self.cells.get(row);
            self.columns.keys.iter().filter_map(move |column| {
                cells
                    .and_then(|cells| cells.get(column))
                    .map(|value| (row, column, value))
            })
        })
    }

    /// Reshapes flat rows into a grid.
    ///
    /// Keys are registered in the order rows are visited. A later row with the
    /// same `(row, column)` pair overwrites the earlier one.
    pub fn from_rows<T, I>(
        rows: I,
        row_key: impl Fn(&T) -> R,
        column_key: impl Fn(&T) -> C,
        value: impl Fn(&T) -> V,
    ) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        let mut map = Self::new();
        for item in rows {
            map.set(row_key(&item), column_key(&item), value(&item));
        }
        map
    }

    /// Builds a grid from labels and a `data[row][column]` matrix.
    ///
    /// Fails with [`QueryError::ShapeMismatch`] when the matrix does not have
    /// exactly one row per row label and one column per column label.
    pub fn from_parallel_arrays(
        row_labels: Vec<R>,
        column_labels: Vec<C>,
        data: Vec<Vec<V>>,
    ) -> QueryResult<Self> {
        if data.len() != row_labels.len() {
            return Err(QueryError::ShapeMismatch(format!(
                "{} row labels but {} data rows",
                row_labels.len(),
                data.len()
            )));
        }
        if let Some((index, row)) = data
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != column_labels.len())
        {
            return Err(QueryError::ShapeMismatch(format!(
                "data row {index} has {} values but there are {} column labels",
                row.len(),
                column_labels.len()
            )));
        }

        let mut map = Self::new();
        for column in &column_labels {
            map.add_column_key(column.clone());
        }
        for (row, values) in row_labels.into_iter().zip(data) {
            map.add_row_key(row.clone());
            for (column, value) in column_labels.iter().zip(values) {
                map.set(row.clone(), column.clone(), value);
            }
        }
        Ok(map)
    }

    /// Snapshot of keys and stored cells.
    pub fn contents(&self) -> Map2DContents<R, C, V>
    where
        V: Clone,
    {
        Map2DContents {
            row_keys: self.rows.keys.clone(),
            column_keys: self.columns.keys.clone(),
            cells: self
                .iter()
                .map(|(row, column, value)| Map2DCell {
                    row: row.clone(),
                    column: column.clone(),
                    value: value.clone(),
                })
                .collect(),
        }
    }

    /// Rebuilds a grid from a snapshot, keeping its axis order.
    pub fn from_contents(contents: Map2DContents<R, C, V>) -> Self {
        let mut map = Self::new();
        for row in contents.row_keys {
            map.add_row_key(row);
        }
        for column in contents.column_keys {
            map.add_column_key(column);
        }
        for cell in contents.cells {
            map.set(cell.row, cell.column, cell.value);
        }
        map
    }
}

/// Serializable form of a [`Map2D`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Map2DContents<R, C, V> {
    pub row_keys: Vec<R>,
    pub column_keys: Vec<C>,
    pub cells: Vec<Map2DCell<R, C, V>>,
}

/// One stored cell of a [`Map2DContents`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Map2DCell<R, C, V> {
    pub row: R,
    pub column: C,
    pub value: V,
}
