//! Mutations buffered for transactional or batched commit.

use crate::row::Row;
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// The kind of change a mutation makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MutationKind {
    /// Insert a new row; fails if the key already exists.
    Insert,
    /// Update an existing row; fails if the key does not exist.
    Update,
    /// Insert the row, or overwrite the given columns if it exists.
    InsertOrUpdate,
    /// Delete the row with the given key; deleting a missing row is a no-op.
    Delete,
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MutationKind::Insert => write!(f, "insert"),
            MutationKind::Update => write!(f, "update"),
            MutationKind::InsertOrUpdate => write!(f, "insert_or_update"),
            MutationKind::Delete => write!(f, "delete"),
        }
    }
}

/// A single row change against one table.
///
/// For deletes, `row` holds only the key columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mutation {
    kind: MutationKind,
    table: String,
    key_columns: Vec<String>,
    row: Row,
}

impl Mutation {
    /// Insert a full row.
    pub fn insert(table: impl Into<String>, row: Row) -> Self {
        Self {
            kind: MutationKind::Insert,
            table: table.into(),
            key_columns: Vec::new(),
            row,
        }
    }

    /// Update the columns present in `row` for the row identified by `key_columns`.
    pub fn update(table: impl Into<String>, key_columns: &[&str], row: Row) -> Self {
        Self {
            kind: MutationKind::Update,
            table: table.into(),
            key_columns: key_columns.iter().map(|c| c.to_string()).collect(),
            row,
        }
    }

    /// Insert the row, or update its non-key columns on key conflict.
    pub fn insert_or_update(table: impl Into<String>, key_columns: &[&str], row: Row) -> Self {
        Self {
            kind: MutationKind::InsertOrUpdate,
            table: table.into(),
            key_columns: key_columns.iter().map(|c| c.to_string()).collect(),
            row,
        }
    }

    /// Delete the row whose key columns equal `key`.
    pub fn delete(table: impl Into<String>, key: Row) -> Self {
        Self {
            kind: MutationKind::Delete,
            table: table.into(),
            key_columns: key.column_names().cloned().collect(),
            row: key,
        }
    }

    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn key_columns(&self) -> &[String] {
        &self.key_columns
    }

    pub fn row(&self) -> &Row {
        &self.row
    }

    /// Values of the key columns, in key column order.
    pub fn key_values(&self) -> Vec<Value> {
        self.row.values_of(&self.key_columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_takes_key_columns_from_row() {
        let m = Mutation::delete(
            "BrowserReleases",
            Row::new()
                .with("BrowserName", "chrome")
                .with("BrowserVersion", "120"),
        );

        assert_eq!(m.kind(), MutationKind::Delete);
        assert_eq!(m.key_columns(), &["BrowserName", "BrowserVersion"]);
        assert_eq!(
            m.key_values(),
            vec![Value::from("chrome"), Value::from("120")]
        );
    }

    #[test]
    fn upsert_keeps_key_columns() {
        let m = Mutation::insert_or_update(
            "WebFeatures",
            &["ID"],
            Row::new().with("ID", "abc").with("Name", "Grid"),
        );
        assert_eq!(m.kind(), MutationKind::InsertOrUpdate);
        assert_eq!(m.key_values(), vec![Value::from("abc")]);
        assert_eq!(m.table(), "WebFeatures");
    }
}
