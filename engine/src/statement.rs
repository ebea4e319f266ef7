//! Query statements issued by mappers and query builders.
//!
//! A [`Statement`] is either a structured [`Select`], which every backend can
//! evaluate, or a raw SQL template with `@name` parameters for the
//! hand-written aggregate reports that only a SQL backend runs.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Comparison operator in a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    /// SQL spelling of the operator.
    pub fn as_sql(&self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "<>",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }

    /// Check whether an ordering satisfies this operator.
    pub fn matches(&self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            CmpOp::Eq => ordering == Equal,
            CmpOp::Ne => ordering != Equal,
            CmpOp::Lt => ordering == Less,
            CmpOp::Le => ordering != Greater,
            CmpOp::Gt => ordering == Greater,
            CmpOp::Ge => ordering != Less,
        }
    }
}

/// Row filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Predicate {
    /// `column op value`
    Compare {
        column: String,
        op: CmpOp,
        value: Value,
    },
    /// `column IN (values...)`
    In { column: String, values: Vec<Value> },
    /// `(c1, c2, ...) op (v1, v2, ...)`, compared lexicographically.
    /// Used for keyset pagination.
    RowCompare {
        columns: Vec<String>,
        op: CmpOp,
        values: Vec<Value>,
    },
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    Asc,
    Desc,
}

/// A structured single-table SELECT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Select {
    pub table: String,
    /// Projected columns; empty means all columns.
    pub columns: Vec<String>,
    pub predicates: Vec<Predicate>,
    pub order_by: Vec<(String, Direction)>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Select {
    /// Start a select over all columns of a table.
    pub fn from_table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            predicates: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Restrict the projected columns.
    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Add an equality filter.
    pub fn filter_eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(column, CmpOp::Eq, value)
    }

    /// Add a comparison filter.
    pub fn filter(mut self, column: impl Into<String>, op: CmpOp, value: impl Into<Value>) -> Self {
        self.predicates.push(Predicate::Compare {
            column: column.into(),
            op,
            value: value.into(),
        });
        self
    }

    /// Add an `IN` filter.
    pub fn filter_in(mut self, column: impl Into<String>, values: Vec<Value>) -> Self {
        self.predicates.push(Predicate::In {
            column: column.into(),
            values,
        });
        self
    }

    /// Add a row-tuple comparison filter.
    pub fn filter_row(mut self, columns: &[&str], op: CmpOp, values: Vec<Value>) -> Self {
        self.predicates.push(Predicate::RowCompare {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            op,
            values,
        });
        self
    }

    /// Append a sort key.
    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.order_by.push((column.into(), direction));
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// A query to execute against the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Statement {
    Select(Select),
    /// Raw SQL with `@name` placeholders bound from `params`.
    Raw {
        sql: String,
        params: BTreeMap<String, Value>,
    },
}

impl Statement {
    /// Create a raw SQL statement.
    pub fn raw(sql: impl Into<String>) -> Self {
        Statement::Raw {
            sql: sql.into(),
            params: BTreeMap::new(),
        }
    }

    /// Bind a named parameter on a raw statement.
    ///
    /// Binding on a structured select is a no-op.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        if let Statement::Raw { params, .. } = &mut self {
            params.insert(name.into(), value.into());
        }
        self
    }

    /// Table a structured select reads from.
    pub fn table(&self) -> Option<&str> {
        match self {
            Statement::Select(select) => Some(&select.table),
            Statement::Raw { .. } => None,
        }
    }
}

impl From<Select> for Statement {
    fn from(select: Select) -> Self {
        Statement::Select(select)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    #[test]
    fn builder_collects_clauses() {
        let stmt: Statement = Select::from_table("BrowserReleases")
            .filter_eq("BrowserName", "chrome")
            .filter_row(
                &["ReleaseDate", "BrowserVersion"],
                CmpOp::Gt,
                vec![Value::from(1i64), Value::from("120")],
            )
            .order_by("ReleaseDate", Direction::Asc)
            .limit(11)
            .into();

        let Statement::Select(select) = stmt else {
            panic!("expected select");
        };
        assert_eq!(select.table, "BrowserReleases");
        assert_eq!(select.predicates.len(), 2);
        assert_eq!(select.limit, Some(11));
    }

    #[test]
    fn bind_only_applies_to_raw() {
        let stmt = Statement::raw("SELECT 1 WHERE @a = @a").bind("a", 1i64);
        match stmt {
            Statement::Raw { params, .. } => assert_eq!(params.get("a"), Some(&Value::Int64(1))),
            _ => panic!("expected raw"),
        }

        let select: Statement = Select::from_table("T").into();
        assert_eq!(select.clone().bind("a", 1i64), select);
    }

    #[test]
    fn cmp_op_matches() {
        assert!(CmpOp::Ge.matches(Ordering::Equal));
        assert!(!CmpOp::Gt.matches(Ordering::Equal));
        assert!(CmpOp::Ne.matches(Ordering::Less));
    }
}
