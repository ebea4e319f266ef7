//! Web features, keyed by their external feature key.

use super::{browser_feature_availabilities, chromium_histograms, feature_baseline_status};
use crate::client::Client;
use crate::db::Database;
use crate::entity::{
    read_all, read_row_by_key, remove_by_key, sync, sync_until, upsert_and_get_id,
    ChildDeleteMapper, ChildDeletes, SyncReport,
};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use featuredb_engine::{
    DeleteKeyMapper, Direction, ExternalKeyMapper, FromRow, GetIdMapper, InternalKeyMapper,
    MergeAndCheckChangedMapper, MergeMapper, Mutation, Row, Select, SelectAllMapper,
    SelectOneMapper, Statement, StoredMapper, TableMapper, ToRow, Value,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use uuid::Uuid;

pub const TABLE: &str = "WebFeatures";

/// Child tables whose rows reference a web feature, with their primary keys.
const CHILD_TABLES: [(&str, &[&str]); 3] = [
    (
        browser_feature_availabilities::TABLE,
        &["WebFeatureID", "BrowserName", "BrowserVersion"],
    ),
    (feature_baseline_status::TABLE, &["WebFeatureID"]),
    (chromium_histograms::FEATURE_ENUM_VALUES_TABLE, &["WebFeatureID"]),
];

/// Most parent ids bound into one child key lookup. PostgreSQL caps a
/// statement at 65535 bind parameters.
const CHILD_LOOKUP_CHUNK: usize = 1000;

/// Key lookups for `table` rows referencing any of `ids`, at most
/// [`CHILD_LOOKUP_CHUNK`] ids per statement.
fn child_key_selects(table: &str, key_columns: &[&str], ids: &[Value]) -> Vec<Statement> {
    ids.chunks(CHILD_LOOKUP_CHUNK)
        .map(|chunk| {
            Select::from_table(table)
                .columns(key_columns)
                .filter_in("WebFeatureID", chunk.to_vec())
                .into()
        })
        .collect()
}

/// A web platform feature as callers describe it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebFeature {
    pub feature_key: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub description_html: String,
}

/// A stored web feature with its generated identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredWebFeature {
    pub id: String,
    pub feature: WebFeature,
}

impl FromRow for StoredWebFeature {
    fn from_row(row: &Row) -> featuredb_engine::Result<Self> {
        Ok(Self {
            id: row.try_get("ID")?,
            feature: WebFeature {
                feature_key: row.try_get("FeatureKey")?,
                name: row.try_get("Name")?,
                description: row.try_get("Description")?,
                description_html: row.try_get("DescriptionHtml")?,
            },
        })
    }
}

impl ToRow for StoredWebFeature {
    fn to_row(&self) -> Row {
        Row::new()
            .with("ID", &self.id)
            .with("FeatureKey", &self.feature.feature_key)
            .with("Name", &self.feature.name)
            .with("Description", &self.feature.description)
            .with("DescriptionHtml", &self.feature.description_html)
    }
}

pub struct WebFeatureMapper;

impl TableMapper for WebFeatureMapper {
    fn table() -> &'static str {
        TABLE
    }
}

impl SelectOneMapper for WebFeatureMapper {
    type Key = String;

    fn select_one(key: &String) -> Statement {
        Select::from_table(TABLE)
            .filter_eq("FeatureKey", key)
            .limit(1)
            .into()
    }
}

impl ExternalKeyMapper for WebFeatureMapper {
    type External = WebFeature;

    fn key_from_external(external: &WebFeature) -> String {
        external.feature_key.clone()
    }
}

impl StoredMapper for WebFeatureMapper {
    type Stored = StoredWebFeature;

    fn key_columns() -> &'static [&'static str] {
        &["ID"]
    }

    fn to_stored(external: &WebFeature) -> StoredWebFeature {
        StoredWebFeature {
            id: Uuid::new_v4().to_string(),
            feature: external.clone(),
        }
    }
}

impl MergeMapper for WebFeatureMapper {
    fn merge(external: &WebFeature, existing: StoredWebFeature) -> StoredWebFeature {
        StoredWebFeature {
            id: existing.id,
            feature: external.clone(),
        }
    }
}

impl MergeAndCheckChangedMapper for WebFeatureMapper {
    fn merge_and_check_changed(
        external: &WebFeature,
        existing: StoredWebFeature,
    ) -> (StoredWebFeature, bool) {
        let changed = existing.feature != *external;
        (Self::merge(external, existing), changed)
    }
}

impl InternalKeyMapper for WebFeatureMapper {
    fn key_from_stored(stored: &StoredWebFeature) -> String {
        stored.feature.feature_key.clone()
    }
}

impl SelectAllMapper for WebFeatureMapper {
    fn select_all() -> Statement {
        Select::from_table(TABLE)
            .order_by("FeatureKey", Direction::Asc)
            .into()
    }
}

impl DeleteKeyMapper for WebFeatureMapper {
    fn delete_key(key: &String) -> Row {
        Row::new().with("FeatureKey", key)
    }
}

impl GetIdMapper for WebFeatureMapper {
    type Id = String;

    fn id_column() -> &'static str {
        "ID"
    }

    fn select_id(key: &String) -> Statement {
        Select::from_table(TABLE)
            .columns(&["ID"])
            .filter_eq("FeatureKey", key)
            .limit(1)
            .into()
    }
}

#[async_trait]
impl ChildDeleteMapper for WebFeatureMapper {
    async fn child_delete_mutations(
        db: &dyn Database,
        parents: &[StoredWebFeature],
    ) -> StoreResult<Vec<ChildDeletes>> {
        let ids: Vec<Value> = parents.iter().map(|p| Value::from(&p.id)).collect();
        let mut children = Vec::with_capacity(CHILD_TABLES.len());
        for (table, key_columns) in CHILD_TABLES {
            let mut mutations = Vec::new();
            for statement in child_key_selects(table, key_columns, &ids) {
                let keys: Vec<Row> = read_all(db, &statement).await?;
                mutations.extend(keys.into_iter().map(|key| Mutation::delete(table, key)));
            }
            children.push(ChildDeletes {
                table: table.to_string(),
                mutations,
            });
        }
        Ok(children)
    }
}

impl Client {
    /// Insert or update a feature and return its identifier.
    pub async fn upsert_web_feature(&self, feature: &WebFeature) -> StoreResult<String> {
        upsert_and_get_id::<WebFeatureMapper>(self.db(), feature).await
    }

    pub async fn get_web_feature(&self, feature_key: &str) -> StoreResult<StoredWebFeature> {
        read_row_by_key::<WebFeatureMapper>(self.db(), &feature_key.to_string()).await
    }

    /// Resolve a feature key to the feature's identifier.
    pub async fn get_web_feature_id(&self, feature_key: &str) -> StoreResult<String> {
        let rows = self
            .db()
            .query(&WebFeatureMapper::select_id(&feature_key.to_string()))
            .await?;
        let row = rows.first().ok_or(StoreError::QueryReturnedNoResults)?;
        Ok(row.try_get("ID")?)
    }

    /// Remove a feature along with everything that references it.
    pub async fn delete_web_feature(&self, feature_key: &str) -> StoreResult<()> {
        remove_by_key::<WebFeatureMapper>(self.db(), &feature_key.to_string()).await
    }

    /// Make the feature table hold exactly `features`.
    ///
    /// Features missing from `features` are deleted together with their
    /// availability, baseline status and histogram rows.
    pub async fn sync_web_features(&self, features: &[WebFeature]) -> StoreResult<SyncReport> {
        sync::<WebFeatureMapper>(self, features).await
    }

    pub async fn sync_web_features_until<C>(
        &self,
        features: &[WebFeature],
        cancel: C,
    ) -> StoreResult<SyncReport>
    where
        C: Future<Output = ()> + Send,
    {
        sync_until::<WebFeatureMapper, _>(self, features, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::tables::browser_feature_availabilities::BrowserFeatureAvailabilityMapper;
    use crate::tables::testing::{memory_client, memory_db, sample_feature};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_upsert_returns_stable_id() {
        let client = memory_client();
        let id = client.upsert_web_feature(&sample_feature("grid")).await.unwrap();

        assert_eq!(client.get_web_feature_id("grid").await.unwrap(), id);
        let stored = client.get_web_feature("grid").await.unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(stored.feature.name, "Feature grid");
    }

    #[tokio::test]
    async fn test_get_missing_feature() {
        let client = memory_client();
        let err = client.get_web_feature_id("nope").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_sync_deletes_children_before_parents() {
        let db = memory_db();
        let client = Client::new(Arc::new(db.clone()));
        client.upsert_web_feature(&sample_feature("grid")).await.unwrap();
        client.upsert_web_feature(&sample_feature("subgrid")).await.unwrap();
        for browser in ["chrome", "firefox", "safari"] {
            client
                .upsert_browser_feature_availability("subgrid", browser, "120")
                .await
                .unwrap();
        }

        let report = client
            .sync_web_features(&[sample_feature("grid")])
            .await
            .unwrap();

        assert_eq!(report.deleted, 1);
        assert_eq!(report.child_deleted, 3);
        assert_eq!(db.row_count(TABLE).await.unwrap(), 1);
        assert_eq!(
            db.row_count(BrowserFeatureAvailabilityMapper::table())
                .await
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_child_lookups_are_chunked() {
        let ids: Vec<Value> = (0..CHILD_LOOKUP_CHUNK * 2 + 1)
            .map(|i| Value::from(format!("id-{i}")))
            .collect();
        let selects = child_key_selects(TABLE, &["WebFeatureID"], &ids);
        assert_eq!(selects.len(), 3);
        assert!(child_key_selects(TABLE, &["WebFeatureID"], &[]).is_empty());
    }

    #[tokio::test]
    async fn test_child_deletes_span_lookup_chunks() {
        let client = memory_client();
        let mut parents = Vec::new();
        for key in ["grid", "subgrid"] {
            client.upsert_web_feature(&sample_feature(key)).await.unwrap();
            client
                .upsert_browser_feature_availability(key, "chrome", "120")
                .await
                .unwrap();
            parents.push(client.get_web_feature(key).await.unwrap());
        }
        // Put the stored features in the first and last lookup.
        let filler = (0..CHILD_LOOKUP_CHUNK).map(|i| StoredWebFeature {
            id: format!("absent-{i}"),
            feature: sample_feature(&format!("absent-{i}")),
        });
        let last = parents.pop().unwrap();
        parents.extend(filler);
        parents.push(last);

        let children = WebFeatureMapper::child_delete_mutations(client.db(), &parents)
            .await
            .unwrap();
        let availability = children
            .iter()
            .find(|c| c.table == BrowserFeatureAvailabilityMapper::table())
            .unwrap();
        assert_eq!(availability.mutations.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_web_feature() {
        let client = memory_client();
        client.upsert_web_feature(&sample_feature("grid")).await.unwrap();

        client.delete_web_feature("grid").await.unwrap();

        let err = client.get_web_feature("grid").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = client.delete_web_feature("grid").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
