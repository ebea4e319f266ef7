//! PostgreSQL rendering of statements and mutations.
//!
//! Identifiers are always double-quoted so the PascalCase table and column
//! names survive Postgres case folding. Parameters become `$n` placeholders;
//! NULL values are inlined as `NULL` literals so the server never has to
//! guess the type of an untyped null parameter.

use crate::error::{Error, Result};
use crate::mutation::{Mutation, MutationKind};
use crate::statement::{CmpOp, Predicate, Select, Statement};
use crate::value::Value;
use std::collections::{BTreeMap, HashMap};

/// SQL text plus positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Quote an identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[derive(Default)]
struct Params {
    values: Vec<Value>,
}

impl Params {
    /// Placeholder for a value, or `NULL` for null values.
    fn placeholder(&mut self, value: &Value) -> String {
        if value.is_null() {
            return "NULL".to_string();
        }
        self.values.push(value.clone());
        format!("${}", self.values.len())
    }
}

/// Render a statement for PostgreSQL.
pub fn render_statement(statement: &Statement) -> Result<SqlQuery> {
    match statement {
        Statement::Select(select) => render_select(select),
        Statement::Raw { sql, params } => render_raw(sql, params),
    }
}

fn render_select(select: &Select) -> Result<SqlQuery> {
    let mut params = Params::default();

    let projection = if select.columns.is_empty() {
        "*".to_string()
    } else {
        select
            .columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut sql = format!("SELECT {} FROM {}", projection, quote_ident(&select.table));

    if !select.predicates.is_empty() {
        let clauses = select
            .predicates
            .iter()
            .map(|p| render_predicate(p, &mut params))
            .collect::<Result<Vec<_>>>()?;
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }

    if !select.order_by.is_empty() {
        let keys = select
            .order_by
            .iter()
            .map(|(column, direction)| {
                let dir = match direction {
                    crate::statement::Direction::Asc => "ASC",
                    crate::statement::Direction::Desc => "DESC",
                };
                format!("{} {}", quote_ident(column), dir)
            })
            .collect::<Vec<_>>();
        sql.push_str(" ORDER BY ");
        sql.push_str(&keys.join(", "));
    }

    if let Some(limit) = select.limit {
        sql.push_str(&format!(" LIMIT {}", limit.max(0)));
    }
    if let Some(offset) = select.offset {
        sql.push_str(&format!(" OFFSET {}", offset.max(0)));
    }

    Ok(SqlQuery {
        sql,
        params: params.values,
    })
}

fn render_predicate(predicate: &Predicate, params: &mut Params) -> Result<String> {
    match predicate {
        Predicate::Compare { column, op, value } => {
            let column = quote_ident(column);
            Ok(match (op, value.is_null()) {
                (CmpOp::Eq, true) => format!("{} IS NULL", column),
                (CmpOp::Ne, true) => format!("{} IS NOT NULL", column),
                _ => format!("{} {} {}", column, op.as_sql(), params.placeholder(value)),
            })
        }
        Predicate::In { column, values } => {
            if values.is_empty() {
                return Ok("FALSE".to_string());
            }
            let placeholders = values
                .iter()
                .map(|v| params.placeholder(v))
                .collect::<Vec<_>>();
            Ok(format!(
                "{} IN ({})",
                quote_ident(column),
                placeholders.join(", ")
            ))
        }
        Predicate::RowCompare {
            columns,
            op,
            values,
        } => {
            if columns.is_empty() || columns.len() != values.len() {
                return Err(Error::InvalidInput(format!(
                    "row comparison needs matching columns and values, got {} and {}",
                    columns.len(),
                    values.len()
                )));
            }
            let lhs = columns
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", ");
            let rhs = values
                .iter()
                .map(|v| params.placeholder(v))
                .collect::<Vec<_>>()
                .join(", ");
            Ok(format!("({}) {} ({})", lhs, op.as_sql(), rhs))
        }
    }
}

/// Rewrite `@name` parameters into `$n` placeholders.
///
/// Text inside single-quoted literals is left alone. A name used more than
/// once maps to the same placeholder.
fn render_raw(sql: &str, named: &BTreeMap<String, Value>) -> Result<SqlQuery> {
    let mut params = Params::default();
    let mut assigned: HashMap<String, String> = HashMap::new();
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut in_literal = false;

    while let Some(c) = chars.next() {
        if c == '\'' {
            in_literal = !in_literal;
            out.push(c);
            continue;
        }
        if c != '@' || in_literal {
            out.push(c);
            continue;
        }

        let mut name = String::new();
        while let Some(&next) = chars.peek() {
            let valid = if name.is_empty() {
                next.is_ascii_alphabetic() || next == '_'
            } else {
                next.is_ascii_alphanumeric() || next == '_'
            };
            if !valid {
                break;
            }
            name.push(next);
            chars.next();
        }

        if name.is_empty() {
            out.push('@');
            continue;
        }

        let placeholder = match assigned.get(&name) {
            Some(existing) => existing.clone(),
            None => {
                let value = named
                    .get(&name)
                    .ok_or_else(|| Error::UnboundParameter(name.clone()))?;
                let placeholder = params.placeholder(value);
                assigned.insert(name.clone(), placeholder.clone());
                placeholder
            }
        };
        out.push_str(&placeholder);
    }

    Ok(SqlQuery {
        sql: out,
        params: params.values,
    })
}

/// Render a mutation for PostgreSQL.
pub fn render_mutation(mutation: &Mutation) -> Result<SqlQuery> {
    let table = quote_ident(mutation.table());
    let row = mutation.row();
    if row.is_empty() {
        return Err(Error::InvalidInput(format!(
            "{} on {} has no columns",
            mutation.kind(),
            mutation.table()
        )));
    }

    let mut params = Params::default();
    let key_columns = mutation.key_columns();
    if mutation.kind() != MutationKind::Insert {
        if key_columns.is_empty() {
            return Err(Error::InvalidInput(format!(
                "{} on {} has no key columns",
                mutation.kind(),
                mutation.table()
            )));
        }
        if let Some(missing) = key_columns.iter().find(|k| !row.contains(k)) {
            return Err(Error::MissingColumn(missing.clone()));
        }
    }
    let non_key: Vec<&String> = row
        .column_names()
        .filter(|c| !key_columns.contains(*c))
        .collect();

    let sql = match mutation.kind() {
        MutationKind::Insert | MutationKind::InsertOrUpdate => {
            let columns = row
                .column_names()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", ");
            let values = row
                .columns()
                .map(|(_, v)| params.placeholder(v))
                .collect::<Vec<_>>()
                .join(", ");
            let mut sql = format!("INSERT INTO {} ({}) VALUES ({})", table, columns, values);

            if mutation.kind() == MutationKind::InsertOrUpdate {
                let conflict = key_columns
                    .iter()
                    .map(|c| quote_ident(c))
                    .collect::<Vec<_>>()
                    .join(", ");
                if non_key.is_empty() {
                    sql.push_str(&format!(" ON CONFLICT ({}) DO NOTHING", conflict));
                } else {
                    let updates = non_key
                        .iter()
                        .map(|c| format!("{} = EXCLUDED.{}", quote_ident(c), quote_ident(c)))
                        .collect::<Vec<_>>()
                        .join(", ");
                    sql.push_str(&format!(
                        " ON CONFLICT ({}) DO UPDATE SET {}",
                        conflict, updates
                    ));
                }
            }
            sql
        }
        MutationKind::Update => {
            let assignments = if non_key.is_empty() {
                // Touch the first key column so the statement still reports
                // whether the row exists.
                let first = quote_ident(&key_columns[0]);
                format!("{} = {}", first, first)
            } else {
                non_key
                    .iter()
                    .map(|c| {
                        let value = row.get(c).cloned().unwrap_or(Value::Null);
                        format!("{} = {}", quote_ident(c), params.placeholder(&value))
                    })
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            let condition = key_condition(mutation, &mut params);
            format!("UPDATE {} SET {} WHERE {}", table, assignments, condition)
        }
        MutationKind::Delete => {
            let condition = key_condition(mutation, &mut params);
            format!("DELETE FROM {} WHERE {}", table, condition)
        }
    };

    Ok(SqlQuery {
        sql,
        params: params.values,
    })
}

fn key_condition(mutation: &Mutation, params: &mut Params) -> String {
    mutation
        .key_columns()
        .iter()
        .zip(mutation.key_values())
        .map(|(column, value)| {
            if value.is_null() {
                format!("{} IS NULL", quote_ident(column))
            } else {
                format!("{} = {}", quote_ident(column), params.placeholder(&value))
            }
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}
