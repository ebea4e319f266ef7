//! The browser version in which each feature became available.
//!
//! There is one row per (feature, browser) and the version is part of the
//! primary key, so changing it goes through the unique writer.

use crate::client::Client;
use crate::entity::{read_all, upsert_unique};
use crate::error::StoreResult;
use featuredb_engine::{
    Direction, ExternalKeyMapper, FromRow, MergeMapper, Row, Select, SelectOneMapper, Statement,
    StoredMapper, TableMapper, ToRow,
};

pub const TABLE: &str = "BrowserFeatureAvailabilities";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserFeatureAvailability {
    pub web_feature_id: String,
    pub browser_name: String,
    pub browser_version: String,
}

impl FromRow for BrowserFeatureAvailability {
    fn from_row(row: &Row) -> featuredb_engine::Result<Self> {
        Ok(Self {
            web_feature_id: row.try_get("WebFeatureID")?,
            browser_name: row.try_get("BrowserName")?,
            browser_version: row.try_get("BrowserVersion")?,
        })
    }
}

impl ToRow for BrowserFeatureAvailability {
    fn to_row(&self) -> Row {
        Row::new()
            .with("WebFeatureID", &self.web_feature_id)
            .with("BrowserName", &self.browser_name)
            .with("BrowserVersion", &self.browser_version)
    }
}

/// (web feature id, browser name)
pub type AvailabilityKey = (String, String);

pub struct BrowserFeatureAvailabilityMapper;

impl TableMapper for BrowserFeatureAvailabilityMapper {
    fn table() -> &'static str {
        TABLE
    }
}

impl SelectOneMapper for BrowserFeatureAvailabilityMapper {
    type Key = AvailabilityKey;

    fn select_one((feature_id, browser): &AvailabilityKey) -> Statement {
        Select::from_table(TABLE)
            .filter_eq("WebFeatureID", feature_id)
            .filter_eq("BrowserName", browser)
            .limit(1)
            .into()
    }
}

impl ExternalKeyMapper for BrowserFeatureAvailabilityMapper {
    type External = BrowserFeatureAvailability;

    fn key_from_external(external: &BrowserFeatureAvailability) -> AvailabilityKey {
        (
            external.web_feature_id.clone(),
            external.browser_name.clone(),
        )
    }
}

impl StoredMapper for BrowserFeatureAvailabilityMapper {
    type Stored = BrowserFeatureAvailability;

    fn key_columns() -> &'static [&'static str] {
        &["WebFeatureID", "BrowserName", "BrowserVersion"]
    }

    fn to_stored(external: &BrowserFeatureAvailability) -> BrowserFeatureAvailability {
        external.clone()
    }
}

impl MergeMapper for BrowserFeatureAvailabilityMapper {
    fn merge(
        external: &BrowserFeatureAvailability,
        _existing: BrowserFeatureAvailability,
    ) -> BrowserFeatureAvailability {
        external.clone()
    }
}

impl Client {
    /// Record the version in which `browser_name` shipped a feature.
    ///
    /// Replaces any version recorded earlier for the same browser.
    pub async fn upsert_browser_feature_availability(
        &self,
        feature_key: &str,
        browser_name: &str,
        browser_version: &str,
    ) -> StoreResult<()> {
        let availability = BrowserFeatureAvailability {
            web_feature_id: self.get_web_feature_id(feature_key).await?,
            browser_name: browser_name.to_string(),
            browser_version: browser_version.to_string(),
        };
        upsert_unique::<BrowserFeatureAvailabilityMapper>(self.db(), &availability).await
    }

    /// Every browser's availability for a feature, by browser name.
    pub async fn list_browser_feature_availabilities(
        &self,
        feature_key: &str,
    ) -> StoreResult<Vec<BrowserFeatureAvailability>> {
        let feature_id = self.get_web_feature_id(feature_key).await?;
        let statement: Statement = Select::from_table(TABLE)
            .filter_eq("WebFeatureID", feature_id)
            .order_by("BrowserName", Direction::Asc)
            .into();
        read_all(self.db(), &statement).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryDatabase;
    use crate::error::ErrorKind;
    use crate::tables::schema;
    use crate::tables::testing::sample_feature;
    use std::sync::Arc;

    async fn setup() -> (MemoryDatabase, Client) {
        let db = MemoryDatabase::new(schema());
        let client = Client::new(Arc::new(db.clone()));
        client.upsert_web_feature(&sample_feature("grid")).await.unwrap();
        (db, client)
    }

    #[tokio::test]
    async fn test_new_version_replaces_old_row() {
        let (db, client) = setup().await;
        client
            .upsert_browser_feature_availability("grid", "chrome", "57")
            .await
            .unwrap();
        client
            .upsert_browser_feature_availability("grid", "chrome", "58")
            .await
            .unwrap();
        client
            .upsert_browser_feature_availability("grid", "firefox", "52")
            .await
            .unwrap();

        let rows = client.list_browser_feature_availabilities("grid").await.unwrap();
        let versions: Vec<_> = rows
            .iter()
            .map(|r| (r.browser_name.as_str(), r.browser_version.as_str()))
            .collect();
        assert_eq!(versions, [("chrome", "58"), ("firefox", "52")]);
        assert_eq!(db.row_count(TABLE).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_same_version_commits_nothing() {
        let (db, client) = setup().await;
        client
            .upsert_browser_feature_availability("grid", "chrome", "57")
            .await
            .unwrap();
        let commits = db.commit_count();

        client
            .upsert_browser_feature_availability("grid", "chrome", "57")
            .await
            .unwrap();

        assert_eq!(db.commit_count(), commits);
    }

    #[tokio::test]
    async fn test_unknown_feature() {
        let (_, client) = setup().await;
        let err = client
            .upsert_browser_feature_availability("missing", "chrome", "57")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
