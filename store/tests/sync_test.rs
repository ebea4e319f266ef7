//! Integration tests for table synchronization.
//!
//! These run against the in-memory backend, which enforces the same keys,
//! unique indexes and cascades as the migrations.

use featuredb_store::tables::web_features::{WebFeature, TABLE as WEB_FEATURES};
use featuredb_store::{Client, ErrorKind, MemoryDatabase};
use std::sync::Arc;
use std::time::Duration;

fn feature(key: &str, name: &str) -> WebFeature {
    WebFeature {
        feature_key: key.to_string(),
        name: name.to_string(),
        description: String::new(),
        description_html: String::new(),
    }
}

fn features(count: usize) -> Vec<WebFeature> {
    (0..count)
        .map(|i| feature(&format!("feature-{i:05}"), &format!("Feature {i}")))
        .collect()
}

fn setup() -> (MemoryDatabase, Client) {
    let db = MemoryDatabase::new(featuredb_store::schema());
    let client = Client::new(Arc::new(db.clone()));
    (db, client)
}

async fn stored_keys(db: &MemoryDatabase) -> Vec<String> {
    let mut keys: Vec<String> = db
        .rows(WEB_FEATURES)
        .await
        .unwrap()
        .iter()
        .map(|row| row.try_get("FeatureKey").unwrap())
        .collect();
    keys.sort();
    keys
}

#[cfg(test)]
mod convergence_tests {
    use super::*;

    #[tokio::test]
    async fn test_sync_converges_and_is_stable() {
        let (db, client) = setup();
        let desired = vec![feature("a", "A"), feature("b", "B"), feature("c", "C")];

        let first = client.sync_web_features(&desired).await.unwrap();
        assert_eq!(first.inserted, 3);
        assert_eq!(stored_keys(&db).await, vec!["a", "b", "c"]);

        let commits = db.commit_count();
        let second = client.sync_web_features(&desired).await.unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.updated, 0);
        assert_eq!(second.deleted, 0);
        assert_eq!(second.unchanged, 3);
        assert_eq!(db.commit_count(), commits);
    }

    #[tokio::test]
    async fn test_sync_replaces_dropped_rows() {
        let (db, client) = setup();
        client
            .sync_web_features(&[feature("a", "A"), feature("b", "B"), feature("c", "C")])
            .await
            .unwrap();
        let a_id = client.get_web_feature_id("a").await.unwrap();

        let report = client
            .sync_web_features(&[feature("a", "A"), feature("d", "D")])
            .await
            .unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.deleted, 2);
        assert_eq!(report.unchanged, 1);
        assert_eq!(stored_keys(&db).await, vec!["a", "d"]);
        assert_eq!(client.get_web_feature_id("a").await.unwrap(), a_id);
    }

    #[tokio::test]
    async fn test_changed_rows_are_updated_in_place() {
        let (_db, client) = setup();
        client.sync_web_features(&[feature("a", "A")]).await.unwrap();
        let id = client.get_web_feature_id("a").await.unwrap();

        let report = client
            .sync_web_features(&[feature("a", "Renamed")])
            .await
            .unwrap();
        assert_eq!(report.updated, 1);

        let stored = client.get_web_feature("a").await.unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(stored.feature.name, "Renamed");
    }

    #[tokio::test]
    async fn test_duplicate_desired_keys_rejected() {
        let (db, client) = setup();
        client.sync_web_features(&[feature("a", "A")]).await.unwrap();

        let err = client
            .sync_web_features(&[feature("b", "B"), feature("b", "Other B")])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SyncMutationCreationFailed);
        assert_eq!(stored_keys(&db).await, vec!["a"]);
    }
}

#[cfg(test)]
mod threshold_tests {
    use super::*;

    #[tokio::test]
    async fn test_below_threshold_commits_once() {
        let (db, client) = setup();
        let client = client.with_batch_write_threshold(5).unwrap();

        let report = client.sync_web_features(&features(4)).await.unwrap();
        assert!(!report.batched);
        assert_eq!(db.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_at_threshold_uses_batches() {
        let (db, client) = setup();
        let client = client
            .with_batch_size(2)
            .unwrap()
            .with_batch_writers(1)
            .unwrap()
            .with_batch_write_threshold(5)
            .unwrap();

        let report = client.sync_web_features(&features(5)).await.unwrap();
        assert!(report.batched);
        assert_eq!(db.row_count(WEB_FEATURES).await.unwrap(), 5);
        assert_eq!(db.commit_count(), 3);
    }

    #[tokio::test]
    async fn test_failed_batch_keeps_earlier_batches() {
        let db = MemoryDatabase::new(featuredb_store::schema()).with_failing_commits_after(1);
        let client = Client::new(Arc::new(db.clone()))
            .with_batch_size(2)
            .unwrap()
            .with_batch_writers(1)
            .unwrap()
            .with_batch_write_threshold(3)
            .unwrap();

        let err = client.sync_web_features(&features(6)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SyncBatchWriteFailed);
        assert_eq!(db.row_count(WEB_FEATURES).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failed_atomic_write_leaves_table_untouched() {
        let db = MemoryDatabase::new(featuredb_store::schema()).with_failing_commits_after(0);
        let client = Client::new(Arc::new(db.clone()));

        let err = client.sync_web_features(&features(3)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SyncAtomicWriteFailed);
        assert_eq!(db.row_count(WEB_FEATURES).await.unwrap(), 0);
    }
}

#[cfg(test)]
mod child_delete_tests {
    use super::*;
    use featuredb_store::tables::browser_feature_availabilities::TABLE as AVAILABILITIES;

    async fn seed(client: &Client) {
        client
            .sync_web_features(&[feature("grid", "Grid"), feature("flexbox", "Flexbox")])
            .await
            .unwrap();
        for browser in ["chrome", "firefox", "safari"] {
            client
                .upsert_browser_feature_availability("grid", browser, "100")
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_children_deleted_in_batches_under_mutation_limit() {
        let db = MemoryDatabase::new(featuredb_store::schema()).with_mutation_limit(2);
        let client = Client::new(Arc::new(db.clone())).with_batch_size(2).unwrap();
        seed(&client).await;

        // One commit removing grid would also cascade to its three
        // availability rows.
        let err = client.delete_web_feature("grid").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InternalQueryFailure);

        let report = client
            .sync_web_features(&[feature("flexbox", "Flexbox")])
            .await
            .unwrap();
        assert_eq!(report.deleted, 1);
        assert_eq!(report.child_deleted, 3);
        assert_eq!(stored_keys(&db).await, vec!["flexbox"]);
        assert_eq!(db.row_count(AVAILABILITIES).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_surviving_features_keep_children() {
        let (db, client) = setup();
        seed(&client).await;

        let report = client
            .sync_web_features(&[feature("grid", "Grid")])
            .await
            .unwrap();
        assert_eq!(report.child_deleted, 0);
        assert_eq!(db.row_count(AVAILABILITIES).await.unwrap(), 3);
    }
}

#[cfg(test)]
mod cancellation_tests {
    use super::*;

    #[tokio::test]
    async fn test_cancelled_before_read() {
        let (db, client) = setup();

        let err = client
            .sync_web_features_until(&features(3), std::future::ready(()))
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.kind(), ErrorKind::SyncReadFailed);
        assert_eq!(db.row_count(WEB_FEATURES).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_during_batches() {
        let db = MemoryDatabase::new(featuredb_store::schema())
            .with_commit_delay(Duration::from_millis(100));
        let client = Client::new(Arc::new(db.clone()))
            .with_batch_size(10)
            .unwrap()
            .with_batch_writers(2)
            .unwrap();

        let mut commits = db.subscribe_commits();
        let cancel = async move {
            let _ = commits.wait_for(|count| *count >= 1).await;
        };

        let err = client
            .sync_web_features_until(&features(200), cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.kind(), ErrorKind::SyncBatchWriteFailed);

        let stored = db.row_count(WEB_FEATURES).await.unwrap();
        assert!(stored > 0 && stored < 200, "stored {stored} rows");
    }
}
