//! Database abstraction.
//!
//! The entity layer talks to a [`Database`] through three primitives: a
//! single-use read, a serializable read-write [`Transaction`] that buffers
//! mutations until commit, and an atomic [`Database::apply`] used by the
//! batch writer. PostgreSQL and an in-memory backend implement them.

mod error;
mod memory;
mod pool;
mod postgres;

pub use error::*;
pub use memory::*;
pub use pool::*;
pub use postgres::*;

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use featuredb_engine::{Mutation, Row, Statement};
use futures::future::BoxFuture;

/// How many times [`read_write`] runs a transaction body that keeps losing
/// serialization conflicts.
pub const MAX_TRANSACTION_ATTEMPTS: usize = 5;

/// A transactional relational database.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run a statement in a fresh single-use read.
    async fn query(&self, statement: &Statement) -> DbResult<Vec<Row>>;

    /// Start a serializable read-write transaction.
    async fn begin(&self) -> DbResult<Box<dyn Transaction>>;

    /// Apply mutations atomically in one commit.
    async fn apply(&self, mutations: Vec<Mutation>) -> DbResult<()>;
}

/// An open read-write transaction.
///
/// Reads see the state as of the transaction, not the buffered mutations.
/// Mutations are applied in buffer order at commit.
#[async_trait]
pub trait Transaction: Send {
    async fn query(&mut self, statement: &Statement) -> DbResult<Vec<Row>>;

    fn buffer(&mut self, mutation: Mutation);

    async fn commit(self: Box<Self>) -> DbResult<()>;

    async fn rollback(self: Box<Self>) -> DbResult<()>;
}

/// Run `body` in a read-write transaction and commit its mutations.
///
/// An error from the body rolls the transaction back. Aborted transactions
/// are run again from the start, so `body` must not keep state between
/// calls.
pub async fn read_write<T, F>(db: &dyn Database, mut body: F) -> StoreResult<T>
where
    T: Send,
    F: for<'t> FnMut(&'t mut dyn Transaction) -> BoxFuture<'t, StoreResult<T>>,
{
    let mut attempt = 1;
    loop {
        let mut txn = db.begin().await?;
        let result = match body(txn.as_mut()).await {
            Ok(value) => txn.commit().await.map(|_| value).map_err(StoreError::from),
            Err(err) => {
                if let Err(rollback_err) = txn.rollback().await {
                    tracing::warn!(error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        };

        match result {
            Err(err) if err.is_retryable() && attempt < MAX_TRANSACTION_ATTEMPTS => {
                tracing::debug!(attempt, error = %err, "Retrying aborted transaction");
                attempt += 1;
            }
            other => return other,
        }
    }
}
