//! Browser releases.

use crate::client::Client;
use crate::entity::{list, read_row_by_key, sync, upsert, ChildDeleteMapper, Page, SyncReport};
use crate::error::StoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use featuredb_engine::{
    CmpOp, DeleteKeyMapper, Direction, ExternalKeyMapper, FromRow, InternalKeyMapper,
    ListMapper, MergeAndCheckChangedMapper, MergeMapper, ReleaseKeyCursor, Row, Select,
    SelectAllMapper, SelectOneMapper, Statement, StoredMapper, TableMapper, ToRow, Value,
};
use serde::{Deserialize, Serialize};

pub const TABLE: &str = "BrowserReleases";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserRelease {
    pub browser_name: String,
    pub browser_version: String,
    pub release_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BrowserReleaseKey {
    pub browser_name: String,
    pub browser_version: String,
}

impl FromRow for BrowserRelease {
    fn from_row(row: &Row) -> featuredb_engine::Result<Self> {
        Ok(Self {
            browser_name: row.try_get("BrowserName")?,
            browser_version: row.try_get("BrowserVersion")?,
            release_date: row.try_get("ReleaseDate")?,
        })
    }
}

impl ToRow for BrowserRelease {
    fn to_row(&self) -> Row {
        Row::new()
            .with("BrowserName", &self.browser_name)
            .with("BrowserVersion", &self.browser_version)
            .with("ReleaseDate", self.release_date)
    }
}

pub struct BrowserReleaseMapper;

impl TableMapper for BrowserReleaseMapper {
    fn table() -> &'static str {
        TABLE
    }
}

impl SelectOneMapper for BrowserReleaseMapper {
    type Key = BrowserReleaseKey;

    fn select_one(key: &BrowserReleaseKey) -> Statement {
        Select::from_table(TABLE)
            .filter_eq("BrowserName", &key.browser_name)
            .filter_eq("BrowserVersion", &key.browser_version)
            .limit(1)
            .into()
    }
}

impl ExternalKeyMapper for BrowserReleaseMapper {
    type External = BrowserRelease;

    fn key_from_external(external: &BrowserRelease) -> BrowserReleaseKey {
        BrowserReleaseKey {
            browser_name: external.browser_name.clone(),
            browser_version: external.browser_version.clone(),
        }
    }
}

impl StoredMapper for BrowserReleaseMapper {
    type Stored = BrowserRelease;

    fn key_columns() -> &'static [&'static str] {
        &["BrowserName", "BrowserVersion"]
    }

    fn to_stored(external: &BrowserRelease) -> BrowserRelease {
        external.clone()
    }
}

impl MergeMapper for BrowserReleaseMapper {
    fn merge(external: &BrowserRelease, existing: BrowserRelease) -> BrowserRelease {
        BrowserRelease {
            release_date: external.release_date,
            ..existing
        }
    }
}

impl MergeAndCheckChangedMapper for BrowserReleaseMapper {
    fn merge_and_check_changed(
        external: &BrowserRelease,
        existing: BrowserRelease,
    ) -> (BrowserRelease, bool) {
        let changed = existing.release_date != external.release_date;
        (Self::merge(external, existing), changed)
    }
}

impl InternalKeyMapper for BrowserReleaseMapper {
    fn key_from_stored(stored: &BrowserRelease) -> BrowserReleaseKey {
        Self::key_from_external(stored)
    }
}

impl SelectAllMapper for BrowserReleaseMapper {
    fn select_all() -> Statement {
        Select::from_table(TABLE)
            .order_by("BrowserName", Direction::Asc)
            .order_by("BrowserVersion", Direction::Asc)
            .into()
    }
}

impl DeleteKeyMapper for BrowserReleaseMapper {
    fn delete_key(key: &BrowserReleaseKey) -> Row {
        Row::new()
            .with("BrowserName", &key.browser_name)
            .with("BrowserVersion", &key.browser_version)
    }
}

// Nothing references a release row.
#[async_trait]
impl ChildDeleteMapper for BrowserReleaseMapper {}

/// Filter for listing releases, newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrowserReleaseFilter {
    pub browser_name: Option<String>,
}

pub struct BrowserReleaseListMapper;

impl TableMapper for BrowserReleaseListMapper {
    fn table() -> &'static str {
        TABLE
    }
}

impl ListMapper for BrowserReleaseListMapper {
    type Params = BrowserReleaseFilter;
    type Cursor = ReleaseKeyCursor;
    type Item = BrowserRelease;

    fn select_page(
        params: &BrowserReleaseFilter,
        cursor: Option<&ReleaseKeyCursor>,
        limit: i64,
    ) -> Statement {
        let mut select = Select::from_table(TABLE);
        if let Some(browser) = &params.browser_name {
            select = select.filter_eq("BrowserName", browser);
        }
        if let Some(cursor) = cursor {
            select = select.filter_row(
                &["ReleaseDate", "BrowserName", "BrowserVersion"],
                CmpOp::Lt,
                vec![
                    Value::from(cursor.last_release_date),
                    Value::from(&cursor.last_browser_name),
                    Value::from(&cursor.last_browser_version),
                ],
            );
        }
        select
            .order_by("ReleaseDate", Direction::Desc)
            .order_by("BrowserName", Direction::Desc)
            .order_by("BrowserVersion", Direction::Desc)
            .limit(limit)
            .into()
    }

    fn next_cursor(
        _params: &BrowserReleaseFilter,
        _previous: Option<&ReleaseKeyCursor>,
        page: &[BrowserRelease],
    ) -> Option<ReleaseKeyCursor> {
        page.last().map(|release| ReleaseKeyCursor {
            last_release_date: release.release_date,
            last_browser_name: release.browser_name.clone(),
            last_browser_version: release.browser_version.clone(),
        })
    }
}

impl Client {
    pub async fn upsert_browser_release(&self, release: &BrowserRelease) -> StoreResult<()> {
        upsert::<BrowserReleaseMapper>(self.db(), release).await
    }

    pub async fn get_browser_release(
        &self,
        browser_name: &str,
        browser_version: &str,
    ) -> StoreResult<BrowserRelease> {
        let key = BrowserReleaseKey {
            browser_name: browser_name.to_string(),
            browser_version: browser_version.to_string(),
        };
        read_row_by_key::<BrowserReleaseMapper>(self.db(), &key).await
    }

    /// Page through releases, most recent first.
    pub async fn list_browser_releases(
        &self,
        filter: &BrowserReleaseFilter,
        page_size: i64,
        page_token: Option<&str>,
    ) -> StoreResult<Page<BrowserRelease>> {
        list::<BrowserReleaseListMapper>(self.db(), filter, page_size, page_token).await
    }

    pub async fn sync_browser_releases(
        &self,
        releases: &[BrowserRelease],
    ) -> StoreResult<SyncReport> {
        sync::<BrowserReleaseMapper>(self, releases).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::tables::testing::memory_client;
    use chrono::TimeZone;

    fn release(browser: &str, version: &str, day: u32) -> BrowserRelease {
        BrowserRelease {
            browser_name: browser.to_string(),
            browser_version: version.to_string(),
            release_date: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_upsert_moves_release_date() {
        let client = memory_client();
        client.upsert_browser_release(&release("chrome", "120", 1)).await.unwrap();
        client.upsert_browser_release(&release("chrome", "120", 9)).await.unwrap();

        let stored = client.get_browser_release("chrome", "120").await.unwrap();
        assert_eq!(stored, release("chrome", "120", 9));
    }

    #[tokio::test]
    async fn test_list_pages_newest_first() {
        let client = memory_client();
        for (version, day) in [("118", 1), ("119", 10), ("120", 20), ("121", 28)] {
            client
                .upsert_browser_release(&release("chrome", version, day))
                .await
                .unwrap();
        }
        client.upsert_browser_release(&release("firefox", "121", 15)).await.unwrap();

        let filter = BrowserReleaseFilter {
            browser_name: Some("chrome".into()),
        };
        let first = client.list_browser_releases(&filter, 3, None).await.unwrap();
        let versions: Vec<_> = first.items.iter().map(|r| r.browser_version.as_str()).collect();
        assert_eq!(versions, ["121", "120", "119"]);

        let token = first.next_page_token.expect("more pages");
        let second = client
            .list_browser_releases(&filter, 3, Some(&token))
            .await
            .unwrap();
        assert_eq!(second.items, vec![release("chrome", "118", 1)]);
        assert!(second.is_last());
    }

    #[tokio::test]
    async fn test_list_pages_through_same_day_releases() {
        let client = memory_client();
        for browser in ["chrome", "edge", "firefox"] {
            client
                .upsert_browser_release(&release(browser, "120", 1))
                .await
                .unwrap();
        }
        client.upsert_browser_release(&release("safari", "17", 2)).await.unwrap();

        let filter = BrowserReleaseFilter::default();
        let mut browsers = Vec::new();
        let mut token = None;
        loop {
            let page = client
                .list_browser_releases(&filter, 1, token.as_deref())
                .await
                .unwrap();
            browsers.extend(page.items.into_iter().map(|r| r.browser_name));
            match page.next_page_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        assert_eq!(browsers, ["safari", "firefox", "edge", "chrome"]);
    }

    #[tokio::test]
    async fn test_sync_releases() {
        let client = memory_client();
        client
            .sync_browser_releases(&[release("chrome", "119", 1), release("chrome", "120", 9)])
            .await
            .unwrap();

        let report = client
            .sync_browser_releases(&[release("chrome", "120", 10), release("firefox", "121", 12)])
            .await
            .unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(report.deleted, 1);
        assert_eq!(report.child_deleted, 0);

        let err = client.get_browser_release("chrome", "119").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let moved = client.get_browser_release("chrome", "120").await.unwrap();
        assert_eq!(moved, release("chrome", "120", 10));
    }

    #[tokio::test]
    async fn test_list_rejects_bad_token() {
        let client = memory_client();
        let err = client
            .list_browser_releases(&BrowserReleaseFilter::default(), 10, Some("%%%"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCursorFormat);
    }

    #[tokio::test]
    async fn test_list_rejects_oversized_page() {
        let client = memory_client();
        client
            .upsert_browser_release(&release("chrome", "120", 1))
            .await
            .unwrap();
        let err = client
            .list_browser_releases(&BrowserReleaseFilter::default(), i64::MAX, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
