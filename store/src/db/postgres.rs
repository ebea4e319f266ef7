//! PostgreSQL backend.

use super::{Database, DbError, DbResult, Transaction};
use async_trait::async_trait;
use featuredb_engine::sql::{render_mutation, render_statement, SqlQuery};
use featuredb_engine::{Mutation, MutationKind, Row, Statement, Value};
use sqlx::postgres::{PgArguments, PgConnection, PgPool, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Postgres, Row as _, TypeInfo};

/// [`Database`] backed by a PostgreSQL pool.
#[derive(Clone)]
pub struct PostgresDatabase {
    pool: PgPool,
    mutation_limit: Option<usize>,
}

impl PostgresDatabase {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            mutation_limit: None,
        }
    }

    /// Reject commits carrying more than `limit` mutations.
    pub fn with_mutation_limit(mut self, limit: usize) -> Self {
        self.mutation_limit = Some(limit);
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin_serializable(&self) -> DbResult<sqlx::Transaction<'static, Postgres>> {
        let mut txn = self.pool.begin().await.map_err(|e| map_sqlx_error("", e))?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *txn)
            .await
            .map_err(|e| map_sqlx_error("", e))?;
        Ok(txn)
    }
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &'q Value,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(v) => query.bind(*v),
        Value::Int64(v) => query.bind(*v),
        Value::Float64(v) => query.bind(*v),
        Value::String(v) => query.bind(v.as_str()),
        Value::Timestamp(v) => query.bind(*v),
        Value::Date(v) => query.bind(*v),
        Value::Json(v) => query.bind(v.clone()),
    }
}

fn build(query: &SqlQuery) -> Query<'_, Postgres, PgArguments> {
    query
        .params
        .iter()
        .fold(sqlx::query(&query.sql), bind_value)
}

/// Convert a PostgreSQL row into an engine row by column type.
fn decode_row(row: &PgRow) -> DbResult<Row> {
    let mut out = Row::new();
    for column in row.columns() {
        let index = column.ordinal();
        let value: Value = match column.type_info().name() {
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
                row.try_get::<Option<String>, _>(index)?.into()
            }
            "INT8" => row.try_get::<Option<i64>, _>(index)?.into(),
            "INT4" => row.try_get::<Option<i32>, _>(index)?.map(i64::from).into(),
            "INT2" => row.try_get::<Option<i16>, _>(index)?.map(i64::from).into(),
            "BOOL" => row.try_get::<Option<bool>, _>(index)?.into(),
            "FLOAT8" => row.try_get::<Option<f64>, _>(index)?.into(),
            "FLOAT4" => row.try_get::<Option<f32>, _>(index)?.map(f64::from).into(),
            "TIMESTAMPTZ" => row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index)?
                .into(),
            "DATE" => row.try_get::<Option<chrono::NaiveDate>, _>(index)?.into(),
            "JSON" | "JSONB" => row.try_get::<Option<serde_json::Value>, _>(index)?.into(),
            other => {
                return Err(DbError::Unsupported(format!(
                    "column {} has unsupported type {}",
                    column.name(),
                    other
                )))
            }
        };
        out.set(column.name(), value);
    }
    Ok(out)
}

/// Classify server errors the entity layer cares about.
fn map_sqlx_error(table: &str, err: sqlx::Error) -> DbError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            // serialization_failure, deadlock_detected
            Some("40001") | Some("40P01") => return DbError::Aborted(db_err.message().to_string()),
            Some("23505") => {
                return DbError::AlreadyExists {
                    table: table.to_string(),
                }
            }
            Some("23503") => return DbError::Constraint(db_err.message().to_string()),
            _ => {}
        }
    }
    DbError::Sqlx(err)
}

async fn fetch(conn: &mut PgConnection, statement: &Statement) -> DbResult<Vec<Row>> {
    let query = render_statement(statement)?;
    let rows = build(&query)
        .fetch_all(conn)
        .await
        .map_err(|e| map_sqlx_error(statement.table().unwrap_or_default(), e))?;
    rows.iter().map(decode_row).collect()
}

async fn execute_mutation(conn: &mut PgConnection, mutation: &Mutation) -> DbResult<()> {
    let query = render_mutation(mutation)?;
    let result = build(&query)
        .execute(conn)
        .await
        .map_err(|e| map_sqlx_error(mutation.table(), e))?;
    if mutation.kind() == MutationKind::Update && result.rows_affected() == 0 {
        return Err(DbError::NotFound {
            table: mutation.table().to_string(),
        });
    }
    Ok(())
}

fn check_limit(count: usize, limit: Option<usize>) -> DbResult<()> {
    match limit {
        Some(limit) if count > limit => Err(DbError::MutationLimitExceeded { count, limit }),
        _ => Ok(()),
    }
}

#[async_trait]
impl Database for PostgresDatabase {
    async fn query(&self, statement: &Statement) -> DbResult<Vec<Row>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, statement).await
    }

    async fn begin(&self) -> DbResult<Box<dyn Transaction>> {
        let txn = self.begin_serializable().await?;
        Ok(Box::new(PostgresTransaction {
            txn,
            buffered: Vec::new(),
            mutation_limit: self.mutation_limit,
        }))
    }

    async fn apply(&self, mutations: Vec<Mutation>) -> DbResult<()> {
        check_limit(mutations.len(), self.mutation_limit)?;
        let mut txn = self.begin_serializable().await?;
        for mutation in &mutations {
            execute_mutation(&mut txn, mutation).await?;
        }
        txn.commit().await.map_err(|e| map_sqlx_error("", e))?;
        tracing::debug!(mutations = mutations.len(), "Applied mutations");
        Ok(())
    }
}

struct PostgresTransaction {
    txn: sqlx::Transaction<'static, Postgres>,
    buffered: Vec<Mutation>,
    mutation_limit: Option<usize>,
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn query(&mut self, statement: &Statement) -> DbResult<Vec<Row>> {
        fetch(&mut self.txn, statement).await
    }

    fn buffer(&mut self, mutation: Mutation) {
        self.buffered.push(mutation);
    }

    async fn commit(self: Box<Self>) -> DbResult<()> {
        let PostgresTransaction {
            mut txn,
            buffered,
            mutation_limit,
        } = *self;
        check_limit(buffered.len(), mutation_limit)?;
        for mutation in &buffered {
            execute_mutation(&mut txn, mutation).await?;
        }
        txn.commit().await.map_err(|e| map_sqlx_error("", e))
    }

    async fn rollback(self: Box<Self>) -> DbResult<()> {
        self.txn.rollback().await?;
        Ok(())
    }
}
