//! Reading stored rows.

use crate::db::{Database, Transaction};
use crate::error::{StoreError, StoreResult};
use featuredb_engine::{FromRow, Row, Statement, StoredMapper};

/// Decode rows into stored structs.
pub fn decode_rows<T: FromRow>(rows: Vec<Row>) -> StoreResult<Vec<T>> {
    rows.iter()
        .map(|row| T::from_row(row).map_err(StoreError::from))
        .collect()
}

fn first<T: FromRow>(rows: Vec<Row>) -> StoreResult<Option<T>> {
    rows.first()
        .map(|row| T::from_row(row).map_err(StoreError::from))
        .transpose()
}

/// Run a statement in a single-use read and decode every row.
pub async fn read_all<T: FromRow>(db: &dyn Database, statement: &Statement) -> StoreResult<Vec<T>> {
    decode_rows(db.query(statement).await?)
}

pub async fn read_all_in<T: FromRow>(
    txn: &mut dyn Transaction,
    statement: &Statement,
) -> StoreResult<Vec<T>> {
    decode_rows(txn.query(statement).await?)
}

/// Run a statement and decode its first row.
///
/// Fails with [`StoreError::QueryReturnedNoResults`] when nothing matches.
pub async fn read_one<T: FromRow>(db: &dyn Database, statement: &Statement) -> StoreResult<T> {
    first(db.query(statement).await?)?.ok_or(StoreError::QueryReturnedNoResults)
}

/// Run a statement and decode its first row, if any.
pub async fn read_optional<T: FromRow>(
    db: &dyn Database,
    statement: &Statement,
) -> StoreResult<Option<T>> {
    first(db.query(statement).await?)
}

pub async fn read_one_in<T: FromRow>(
    txn: &mut dyn Transaction,
    statement: &Statement,
) -> StoreResult<T> {
    read_optional_in(txn, statement)
        .await?
        .ok_or(StoreError::QueryReturnedNoResults)
}

pub async fn read_optional_in<T: FromRow>(
    txn: &mut dyn Transaction,
    statement: &Statement,
) -> StoreResult<Option<T>> {
    first(txn.query(statement).await?)
}

/// Read the stored row for `key`.
pub async fn read_row_by_key<M: StoredMapper>(
    db: &dyn Database,
    key: &M::Key,
) -> StoreResult<M::Stored> {
    read_one(db, &M::select_one(key)).await
}

/// Read the stored row for `key` inside a caller's transaction.
pub async fn read_row_by_key_in<M: StoredMapper>(
    txn: &mut dyn Transaction,
    key: &M::Key,
) -> StoreResult<M::Stored> {
    read_one_in(txn, &M::select_one(key)).await
}
