//! Creating rows with generated identifiers.

use crate::db::{read_write, Database, Transaction};
use crate::error::StoreResult;
use chrono::Utc;
use featuredb_engine::{CreateMapper, Mutation, ToRow};
use uuid::Uuid;

/// Insert a new entity and return its generated identifier.
pub async fn create<M: CreateMapper>(db: &dyn Database, input: &M::Input) -> StoreResult<String> {
    let input = input.clone();
    read_write(db, move |txn| {
        let input = input.clone();
        Box::pin(async move { create_in::<M>(txn, &input) })
    })
    .await
}

/// Buffer the insert for a new entity in a caller's transaction.
pub fn create_in<M: CreateMapper>(
    txn: &mut dyn Transaction,
    input: &M::Input,
) -> StoreResult<String> {
    let id = Uuid::new_v4().to_string();
    let stored = M::new_entity(&id, input, Utc::now());
    txn.buffer(Mutation::insert(M::table(), stored.to_row()));
    tracing::debug!(table = M::table(), id = %id, "Buffered new entity");
    Ok(id)
}
