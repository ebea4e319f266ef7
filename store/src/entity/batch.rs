//! Concurrent batch writer.
//!
//! A producer task feeds items into a bounded channel. A fixed pool of
//! workers drains it, converts each item into a mutation and commits full
//! batches through [`Database::apply`]. Each worker has at most one batch in
//! flight and commits its batches in the order it filled them; batches from
//! different workers commit in any order.
//!
//! Batches are independent commits. When a worker fails or the caller
//! cancels, the remaining workers are aborted, but batches that already
//! committed stay committed.

use crate::db::Database;
use crate::error::{StoreError, StoreResult};
use featuredb_engine::Mutation;
use std::future::{self, Future};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;

/// Fans mutations out over a pool of batching workers.
#[derive(Clone)]
pub struct BatchWriter {
    db: Arc<dyn Database>,
    batch_size: usize,
    workers: usize,
}

impl BatchWriter {
    pub fn new(db: Arc<dyn Database>, batch_size: usize, workers: usize) -> Self {
        Self {
            db,
            batch_size: batch_size.max(1),
            workers: workers.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Write every item and return how many mutations were committed.
    pub async fn write<T, F>(
        &self,
        table: &str,
        items: Vec<T>,
        to_mutation: F,
    ) -> StoreResult<usize>
    where
        T: Send + 'static,
        F: Fn(T) -> Mutation + Send + Sync + 'static,
    {
        self.write_until(table, items, to_mutation, future::pending())
            .await
    }

    /// Like [`write`](Self::write), but gives up with
    /// [`StoreError::Cancelled`] as soon as `cancel` completes.
    pub async fn write_until<T, F, C>(
        &self,
        table: &str,
        items: Vec<T>,
        to_mutation: F,
        cancel: C,
    ) -> StoreResult<usize>
    where
        T: Send + 'static,
        F: Fn(T) -> Mutation + Send + Sync + 'static,
        C: Future<Output = ()>,
    {
        if items.is_empty() {
            return Ok(0);
        }

        let total = items.len();
        let table: Arc<str> = Arc::from(table);
        let to_mutation = Arc::new(to_mutation);
        let (tx, rx) = mpsc::channel::<T>(self.batch_size);
        let rx = Arc::new(Mutex::new(rx));

        let mut tasks: JoinSet<StoreResult<usize>> = JoinSet::new();
        tasks.spawn(async move {
            for item in items {
                // Receiver gone means the workers were aborted.
                if tx.send(item).await.is_err() {
                    break;
                }
            }
            Ok(0)
        });
        for worker in 0..self.workers {
            tasks.spawn(run_worker(
                worker,
                table.clone(),
                self.db.clone(),
                rx.clone(),
                to_mutation.clone(),
                self.batch_size,
            ));
        }

        tracing::debug!(
            table = %table,
            items = total,
            workers = self.workers,
            batch_size = self.batch_size,
            "Starting batch write"
        );

        tokio::pin!(cancel);
        let mut written = 0;
        loop {
            tokio::select! {
                biased;
                _ = &mut cancel => {
                    tasks.abort_all();
                    tracing::warn!(table = %table, written, "Batch write cancelled");
                    return Err(StoreError::Cancelled);
                }
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok(Ok(count))) => written += count,
                    Some(Ok(Err(err))) => {
                        tasks.abort_all();
                        tracing::error!(
                            table = %table,
                            written,
                            error = %err,
                            "Batch write failed"
                        );
                        return Err(err);
                    }
                    Some(Err(join_err)) => {
                        tasks.abort_all();
                        return Err(StoreError::BatchWorker(join_err));
                    }
                },
            }
        }

        tracing::debug!(table = %table, written, "Batch write finished");
        Ok(written)
    }
}

async fn run_worker<T, F>(
    worker: usize,
    table: Arc<str>,
    db: Arc<dyn Database>,
    rx: Arc<Mutex<mpsc::Receiver<T>>>,
    to_mutation: Arc<F>,
    batch_size: usize,
) -> StoreResult<usize>
where
    F: Fn(T) -> Mutation,
{
    let mut batch = Vec::with_capacity(batch_size);
    let mut written = 0;
    loop {
        let next = rx.lock().await.recv().await;
        let Some(item) = next else { break };
        batch.push(to_mutation(item));
        if batch.len() >= batch_size {
            written += flush(worker, &table, db.as_ref(), &mut batch).await?;
        }
    }
    if !batch.is_empty() {
        written += flush(worker, &table, db.as_ref(), &mut batch).await?;
    }
    Ok(written)
}

async fn flush(
    worker: usize,
    table: &str,
    db: &dyn Database,
    batch: &mut Vec<Mutation>,
) -> StoreResult<usize> {
    let count = batch.len();
    db.apply(std::mem::take(batch)).await?;
    tracing::debug!(worker, table, count, "Committed batch");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryDatabase, TableDef};
    use crate::error::ErrorKind;
    use featuredb_engine::Row;
    use std::time::Duration;

    fn database() -> MemoryDatabase {
        MemoryDatabase::new(vec![TableDef::new("Items", &["ID"])])
    }

    fn insert(n: usize) -> Mutation {
        Mutation::insert("Items", Row::new().with("ID", format!("item-{n}")))
    }

    #[tokio::test]
    async fn test_writes_everything_in_batches() {
        let db = database();
        let writer = BatchWriter::new(Arc::new(db.clone()), 10, 3);

        let written = writer.write("Items", (0..95).collect(), insert).await.unwrap();

        assert_eq!(written, 95);
        assert_eq!(db.row_count("Items").await.unwrap(), 95);
        // Three workers each leave at most one partial batch
        assert!(db.commit_count() >= 10 && db.commit_count() <= 12);
    }

    #[tokio::test]
    async fn test_empty_input_commits_nothing() {
        let db = database();
        let writer = BatchWriter::new(Arc::new(db.clone()), 10, 3);

        let written = writer.write("Items", Vec::<usize>::new(), insert).await.unwrap();

        assert_eq!(written, 0);
        assert_eq!(db.commit_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_keeps_earlier_batches() {
        let db = database().with_failing_commits_after(2);
        let writer = BatchWriter::new(Arc::new(db.clone()), 5, 1);

        let err = writer.write("Items", (0..20).collect(), insert).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InternalQueryFailure);
        assert_eq!(db.row_count("Items").await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_conflicting_batch_reports_error() {
        let db = database();
        let writer = BatchWriter::new(Arc::new(db.clone()), 4, 2);

        let err = writer
            .write("Items", vec![1, 2, 1], insert)
            .await
            .unwrap_err();

        assert!(matches!(
            err.db_error(),
            Some(crate::db::DbError::AlreadyExists { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_after_first_commit() {
        let db = database().with_commit_delay(Duration::from_millis(200));
        let writer = BatchWriter::new(Arc::new(db.clone()), 5000, 8);
        let mut commits = db.subscribe_commits();
        let first_commit = async move {
            let _ = commits.wait_for(|n| *n >= 1).await;
        };

        let err = writer
            .write_until("Items", (0..50_000).collect(), insert, first_commit)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        let rows = db.row_count("Items").await.unwrap();
        assert!(rows > 0, "at least one batch committed");
        assert!(rows < 50_000, "cancellation stopped the write early");
    }
}
