//! Upsert and update.
//!
//! Both are read-modify-write: select the row by the caller's key, then
//! either insert a fresh row or merge into the existing one. The enclosing
//! serializable transaction keeps concurrent writers to the same key from
//! losing updates.

use super::reader::{read_one_in, read_optional_in};
use crate::db::{read_write, Database, Transaction};
use crate::error::{StoreError, StoreResult};
use featuredb_engine::{GetIdMapper, MergeMapper, Mutation, ToRow};

/// Insert `external`, or merge it into the row already stored for its key.
pub async fn upsert<M: MergeMapper>(db: &dyn Database, external: &M::External) -> StoreResult<()> {
    let external = external.clone();
    read_write(db, move |txn| {
        let external = external.clone();
        Box::pin(async move { upsert_in::<M>(txn, &external).await })
    })
    .await
}

pub async fn upsert_in<M: MergeMapper>(
    txn: &mut dyn Transaction,
    external: &M::External,
) -> StoreResult<()> {
    let key = M::key_from_external(external);
    let existing = read_optional_in::<M::Stored>(txn, &M::select_one(&key)).await?;
    let mutation = match existing {
        Some(existing) => {
            let merged = M::merge(external, existing);
            Mutation::insert_or_update(M::table(), M::key_columns(), merged.to_row())
        }
        None => Mutation::insert(M::table(), M::to_stored(external).to_row()),
    };
    txn.buffer(mutation);
    Ok(())
}

/// Merge `external` into its stored row.
///
/// Fails with [`StoreError::QueryReturnedNoResults`] instead of inserting
/// when no row exists.
pub async fn update<M: MergeMapper>(db: &dyn Database, external: &M::External) -> StoreResult<()> {
    let external = external.clone();
    read_write(db, move |txn| {
        let external = external.clone();
        Box::pin(async move { update_in::<M>(txn, &external).await })
    })
    .await
}

pub async fn update_in<M: MergeMapper>(
    txn: &mut dyn Transaction,
    external: &M::External,
) -> StoreResult<()> {
    let key = M::key_from_external(external);
    let existing = read_one_in::<M::Stored>(txn, &M::select_one(&key)).await?;
    let merged = M::merge(external, existing);
    txn.buffer(Mutation::update(
        M::table(),
        M::key_columns(),
        merged.to_row(),
    ));
    Ok(())
}

/// Upsert `external` and return the identifier stored for its key.
pub async fn upsert_and_get_id<M>(db: &dyn Database, external: &M::External) -> StoreResult<M::Id>
where
    M: MergeMapper + GetIdMapper,
{
    upsert::<M>(db, external).await?;

    let key = M::key_from_external(external);
    let rows = db.query(&M::select_id(&key)).await?;
    let row = rows.first().ok_or(StoreError::QueryReturnedNoResults)?;
    Ok(row.try_get::<M::Id>(M::id_column())?)
}
