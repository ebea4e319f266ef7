//! Full-table synchronization.
//!
//! [`sync`] makes a table hold exactly the caller's desired entities. It
//! reads every stored row, plans the diff with [`plan_sync`], then writes in
//! this order:
//!
//! 1. child rows that must go before their parents, per child table, through
//!    the batch writer
//! 2. parent deletes, through the batch writer
//! 3. inserts and updates: one atomic commit below the client's batch write
//!    threshold, the batch writer otherwise
//!
//! A failure stops the remaining phases. Batches committed by earlier
//! phases are not rolled back, so a failed or cancelled sync can leave the
//! table partly converged; running it again finishes the job.

use super::batch::BatchWriter;
use super::reader::read_all;
use crate::client::Client;
use crate::db::Database;
use crate::error::{StoreError, StoreResult, SyncPhase};
use async_trait::async_trait;
use featuredb_engine::{plan_sync, Mutation, SyncMapper};
use futures::future::{FutureExt, Shared};
use futures::future::BoxFuture;
use std::future::{self, Future};

/// Deletes for one child table, issued before the parent rows go.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildDeletes {
    pub table: String,
    pub mutations: Vec<Mutation>,
}

/// Child rows to delete ahead of their parents.
///
/// Deleting a parent cascades to its children, and every cascaded row
/// counts toward the database's per-commit mutation ceiling. Mappers whose
/// rows have many children return explicit deletes for them here so they
/// are spread over batches.
#[async_trait]
pub trait ChildDeleteMapper: SyncMapper {
    async fn child_delete_mutations(
        _db: &dyn Database,
        _parents: &[Self::Stored],
    ) -> StoreResult<Vec<ChildDeletes>> {
        Ok(Vec::new())
    }
}

/// Counts from a sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub child_deleted: usize,
    /// Whether upserts went through the batch writer
    pub batched: bool,
}

/// Synchronize `M`'s table with `desired`.
pub async fn sync<M: ChildDeleteMapper>(
    client: &Client,
    desired: &[M::External],
) -> StoreResult<SyncReport> {
    sync_until::<M, _>(client, desired, future::pending()).await
}

/// Like [`sync`], but stops with a cancelled error once `cancel` completes.
pub async fn sync_until<M, C>(
    client: &Client,
    desired: &[M::External],
    cancel: C,
) -> StoreResult<SyncReport>
where
    M: ChildDeleteMapper,
    C: Future<Output = ()> + Send,
{
    let cancel = cancel.boxed().shared();
    let db = client.db();
    let table = M::table();

    let stored = or_cancelled(read_all::<M::Stored>(db, &M::select_all()), cancel.clone())
        .await
        .map_err(|e| StoreError::sync(SyncPhase::Read, e))?;
    let stored_count = stored.len();

    let plan = plan_sync::<M>(stored, desired)
        .map_err(|e| StoreError::sync(SyncPhase::MutationCreation, e.into()))?;
    tracing::debug!(
        table,
        stored = stored_count,
        desired = desired.len(),
        inserts = plan.inserts.len(),
        updates = plan.updates.len(),
        deletes = plan.deletes.len(),
        "Planned sync"
    );

    let mut report = SyncReport {
        inserted: plan.inserts.len(),
        updated: plan.updates.len(),
        unchanged: plan.unchanged,
        deleted: plan.deletes.len(),
        ..SyncReport::default()
    };
    let writer = client.batch_writer();

    if !plan.deletes.is_empty() {
        let children = or_cancelled(M::child_delete_mutations(db, &plan.deletes), cancel.clone())
            .await
            .map_err(|e| StoreError::sync(SyncPhase::ChildMutations, e))?;
        for child in children {
            report.child_deleted +=
                write_batched(&writer, &child.table, child.mutations, &cancel).await?;
        }
        write_batched(&writer, table, plan.delete_mutations(), &cancel).await?;
    }

    let upserts = plan.upsert_mutations();
    let threshold = client.settings().batch_write_threshold();
    if upserts.len() < threshold {
        if !upserts.is_empty() {
            or_cancelled(
                async { db.apply(upserts).await.map_err(StoreError::from) },
                cancel.clone(),
            )
            .await
            .map_err(|e| StoreError::sync(SyncPhase::AtomicWrite, e))?;
        }
    } else {
        report.batched = true;
        write_batched(&writer, table, upserts, &cancel).await?;
    }

    tracing::info!(
        table,
        inserted = report.inserted,
        updated = report.updated,
        unchanged = report.unchanged,
        deleted = report.deleted,
        child_deleted = report.child_deleted,
        batched = report.batched,
        "Synced table"
    );
    Ok(report)
}

type SharedCancel<'a> = Shared<BoxFuture<'a, ()>>;

async fn write_batched(
    writer: &BatchWriter,
    table: &str,
    mutations: Vec<Mutation>,
    cancel: &SharedCancel<'_>,
) -> StoreResult<usize> {
    writer
        .write_until(table, mutations, std::convert::identity, cancel.clone())
        .await
        .map_err(|e| StoreError::sync(SyncPhase::BatchWrite, e))
}

async fn or_cancelled<T>(
    work: impl Future<Output = StoreResult<T>>,
    cancel: impl Future<Output = ()>,
) -> StoreResult<T> {
    tokio::select! {
        biased;
        _ = cancel => Err(StoreError::Cancelled),
        result = work => result,
    }
}
