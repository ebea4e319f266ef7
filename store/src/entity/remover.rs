//! Deleting rows.

use crate::db::{read_write, Database, Transaction};
use crate::error::{StoreError, StoreResult};
use featuredb_engine::{DeleteKeyMapper, ExternalKeyMapper, Mutation};

/// Delete the row stored for `external`'s key.
///
/// Fails with [`StoreError::QueryReturnedNoResults`] when there is none.
pub async fn remove<M>(db: &dyn Database, external: &M::External) -> StoreResult<()>
where
    M: ExternalKeyMapper + DeleteKeyMapper,
{
    remove_by_key::<M>(db, &M::key_from_external(external)).await
}

pub async fn remove_by_key<M: DeleteKeyMapper>(db: &dyn Database, key: &M::Key) -> StoreResult<()> {
    let key = key.clone();
    read_write(db, move |txn| {
        let key = key.clone();
        Box::pin(async move { remove_by_key_in::<M>(txn, &key).await })
    })
    .await
}

pub async fn remove_by_key_in<M: DeleteKeyMapper>(
    txn: &mut dyn Transaction,
    key: &M::Key,
) -> StoreResult<()> {
    let rows = txn.query(&M::select_one(key)).await?;
    if rows.is_empty() {
        return Err(StoreError::QueryReturnedNoResults);
    }
    txn.buffer(Mutation::delete(M::table(), M::delete_key(key)));
    Ok(())
}
