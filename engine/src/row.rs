//! Rows and the traits that map stored structs to and from them.

use crate::error::{Error, Result};
use crate::value::{FromValue, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single table row: column name to value.
///
/// Uses BTreeMap so rows compare and serialize deterministically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    columns: BTreeMap<String, Value>,
}

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self {
            columns: BTreeMap::new(),
        }
    }

    /// Builder-style column setter.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// Set a column, replacing any previous value.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.columns.insert(column.into(), value.into());
    }

    /// Get a column value.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    /// Get a column converted to a Rust type.
    ///
    /// A missing column is read as NULL, so `Option<T>` targets decode it as
    /// `None` while non-optional targets report [`Error::MissingColumn`].
    pub fn try_get<T: FromValue>(&self, column: &str) -> Result<T> {
        match self.columns.get(column) {
            Some(value) => T::from_value(value).map_err(|e| e.for_column(column)),
            None => {
                T::from_value(&Value::Null).map_err(|_| Error::MissingColumn(column.to_string()))
            }
        }
    }

    /// Check if the row has a column.
    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    /// Iterate columns in name order.
    pub fn columns(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.columns.iter()
    }

    /// Column names in name order.
    pub fn column_names(&self) -> impl Iterator<Item = &String> {
        self.columns.keys()
    }

    /// Copy of this row restricted to the given columns.
    ///
    /// Missing columns are carried as NULL.
    pub fn project<S: AsRef<str>>(&self, columns: &[S]) -> Row {
        columns
            .iter()
            .map(|c| {
                let name = c.as_ref();
                (
                    name.to_string(),
                    self.columns.get(name).cloned().unwrap_or(Value::Null),
                )
            })
            .collect()
    }

    /// Overwrite this row's columns with every column present in `other`.
    pub fn merge_from(&mut self, other: &Row) {
        for (column, value) in &other.columns {
            self.columns.insert(column.clone(), value.clone());
        }
    }

    /// Values for the given columns, in order.
    pub fn values_of<S: AsRef<str>>(&self, columns: &[S]) -> Vec<Value> {
        columns
            .iter()
            .map(|c| self.columns.get(c.as_ref()).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}

/// Decode a struct from a row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> Result<Self>;
}

/// Encode a struct as a row of columns.
pub trait ToRow {
    fn to_row(&self) -> Row;
}

impl FromRow for Row {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(row.clone())
    }
}

impl ToRow for Row {
    fn to_row(&self) -> Row {
        self.clone()
    }
}
