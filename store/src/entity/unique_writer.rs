//! Upsert for rows whose primary key changes with their contents.
//!
//! Some tables allow one row per external key but make the varying value
//! part of the primary key (one version per browser and feature, say).
//! Updating such a row is a delete of the old primary key plus an insert
//! of the new row in the same transaction.

use super::reader::read_optional_in;
use crate::db::{read_write, Database, Transaction};
use crate::error::StoreResult;
use featuredb_engine::{MergeMapper, Mutation, ToRow};

pub async fn upsert_unique<M: MergeMapper>(
    db: &dyn Database,
    external: &M::External,
) -> StoreResult<()> {
    let external = external.clone();
    read_write(db, move |txn| {
        let external = external.clone();
        Box::pin(async move { upsert_unique_in::<M>(txn, &external).await })
    })
    .await
}

pub async fn upsert_unique_in<M: MergeMapper>(
    txn: &mut dyn Transaction,
    external: &M::External,
) -> StoreResult<()> {
    let key = M::key_from_external(external);
    let Some(existing) = read_optional_in::<M::Stored>(txn, &M::select_one(&key)).await? else {
        txn.buffer(Mutation::insert(M::table(), M::to_stored(external).to_row()));
        return Ok(());
    };

    let merged = M::merge(external, existing.clone());
    if merged == existing {
        return Ok(());
    }
    txn.buffer(Mutation::delete(M::table(), M::primary_key_of(&existing)));
    txn.buffer(Mutation::insert(M::table(), merged.to_row()));
    Ok(())
}
