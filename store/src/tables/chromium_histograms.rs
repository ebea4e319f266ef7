//! Chromium usage histograms and their daily metrics.
//!
//! A histogram enum (e.g. `WebDXFeatureObserver`) has one value per bucket.
//! Features map to one bucket, and each bucket gets a daily usage rate. The
//! latest day with data is kept per bucket so readers need not scan.

use crate::client::Client;
use crate::db::read_write;
use crate::entity::{list, read_one_in, upsert, upsert_and_get_id, upsert_in, Page};
use crate::error::StoreResult;
use chrono::NaiveDate;
use featuredb_engine::queries::{DailyHistogramMetric, HistogramMetricMapper, HistogramMetricParams};
use featuredb_engine::{
    ExternalKeyMapper, FromRow, GetIdMapper, MergeMapper, Row, Select, SelectOneMapper,
    Statement, StoredMapper, TableMapper, ToRow,
};
use uuid::Uuid;

pub const ENUMS_TABLE: &str = "ChromiumHistogramEnums";
pub const ENUM_VALUES_TABLE: &str = "ChromiumHistogramEnumValues";
pub const FEATURE_ENUM_VALUES_TABLE: &str = "WebFeatureChromiumHistogramEnumValues";
pub const DAILY_METRICS_TABLE: &str = "DailyChromiumHistogramMetrics";
pub const LATEST_METRICS_TABLE: &str = "LatestDailyChromiumHistogramMetrics";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredHistogramEnum {
    pub id: String,
    pub histogram_name: String,
}

impl FromRow for StoredHistogramEnum {
    fn from_row(row: &Row) -> featuredb_engine::Result<Self> {
        Ok(Self {
            id: row.try_get("ID")?,
            histogram_name: row.try_get("HistogramName")?,
        })
    }
}

impl ToRow for StoredHistogramEnum {
    fn to_row(&self) -> Row {
        Row::new()
            .with("ID", &self.id)
            .with("HistogramName", &self.histogram_name)
    }
}

pub struct HistogramEnumMapper;

impl TableMapper for HistogramEnumMapper {
    fn table() -> &'static str {
        ENUMS_TABLE
    }
}

impl SelectOneMapper for HistogramEnumMapper {
    /// Histogram name
    type Key = String;

    fn select_one(name: &String) -> Statement {
        Select::from_table(ENUMS_TABLE)
            .filter_eq("HistogramName", name)
            .limit(1)
            .into()
    }
}

impl ExternalKeyMapper for HistogramEnumMapper {
    type External = String;

    fn key_from_external(name: &String) -> String {
        name.clone()
    }
}

impl StoredMapper for HistogramEnumMapper {
    type Stored = StoredHistogramEnum;

    fn key_columns() -> &'static [&'static str] {
        &["ID"]
    }

    fn to_stored(name: &String) -> StoredHistogramEnum {
        StoredHistogramEnum {
            id: Uuid::new_v4().to_string(),
            histogram_name: name.clone(),
        }
    }
}

impl MergeMapper for HistogramEnumMapper {
    fn merge(_name: &String, existing: StoredHistogramEnum) -> StoredHistogramEnum {
        existing
    }
}

impl GetIdMapper for HistogramEnumMapper {
    type Id = String;

    fn id_column() -> &'static str {
        "ID"
    }

    fn select_id(name: &String) -> Statement {
        Select::from_table(ENUMS_TABLE)
            .columns(&["ID"])
            .filter_eq("HistogramName", name)
            .limit(1)
            .into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistogramEnumValue {
    pub enum_id: String,
    pub bucket_id: i64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredHistogramEnumValue {
    pub id: String,
    pub value: HistogramEnumValue,
}

impl FromRow for StoredHistogramEnumValue {
    fn from_row(row: &Row) -> featuredb_engine::Result<Self> {
        Ok(Self {
            id: row.try_get("ID")?,
            value: HistogramEnumValue {
                enum_id: row.try_get("ChromiumHistogramEnumID")?,
                bucket_id: row.try_get("BucketID")?,
                label: row.try_get("Label")?,
            },
        })
    }
}

impl ToRow for StoredHistogramEnumValue {
    fn to_row(&self) -> Row {
        Row::new()
            .with("ID", &self.id)
            .with("ChromiumHistogramEnumID", &self.value.enum_id)
            .with("BucketID", self.value.bucket_id)
            .with("Label", &self.value.label)
    }
}

fn enum_value_filter(enum_id: &str, bucket_id: i64) -> Select {
    Select::from_table(ENUM_VALUES_TABLE)
        .filter_eq("ChromiumHistogramEnumID", enum_id)
        .filter_eq("BucketID", bucket_id)
        .limit(1)
}

pub struct HistogramEnumValueMapper;

impl TableMapper for HistogramEnumValueMapper {
    fn table() -> &'static str {
        ENUM_VALUES_TABLE
    }
}

impl SelectOneMapper for HistogramEnumValueMapper {
    /// (enum id, bucket id)
    type Key = (String, i64);

    fn select_one((enum_id, bucket_id): &(String, i64)) -> Statement {
        enum_value_filter(enum_id, *bucket_id).into()
    }
}

impl ExternalKeyMapper for HistogramEnumValueMapper {
    type External = HistogramEnumValue;

    fn key_from_external(value: &HistogramEnumValue) -> (String, i64) {
        (value.enum_id.clone(), value.bucket_id)
    }
}

impl StoredMapper for HistogramEnumValueMapper {
    type Stored = StoredHistogramEnumValue;

    fn key_columns() -> &'static [&'static str] {
        &["ID"]
    }

    fn to_stored(value: &HistogramEnumValue) -> StoredHistogramEnumValue {
        StoredHistogramEnumValue {
            id: Uuid::new_v4().to_string(),
            value: value.clone(),
        }
    }
}

impl MergeMapper for HistogramEnumValueMapper {
    fn merge(
        value: &HistogramEnumValue,
        existing: StoredHistogramEnumValue,
    ) -> StoredHistogramEnumValue {
        StoredHistogramEnumValue {
            id: existing.id,
            value: value.clone(),
        }
    }
}

impl GetIdMapper for HistogramEnumValueMapper {
    type Id = String;

    fn id_column() -> &'static str {
        "ID"
    }

    fn select_id((enum_id, bucket_id): &(String, i64)) -> Statement {
        enum_value_filter(enum_id, *bucket_id)
            .columns(&["ID"])
            .into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureEnumValue {
    pub web_feature_id: String,
    pub enum_value_id: String,
}

impl FromRow for FeatureEnumValue {
    fn from_row(row: &Row) -> featuredb_engine::Result<Self> {
        Ok(Self {
            web_feature_id: row.try_get("WebFeatureID")?,
            enum_value_id: row.try_get("ChromiumHistogramEnumValueID")?,
        })
    }
}

impl ToRow for FeatureEnumValue {
    fn to_row(&self) -> Row {
        Row::new()
            .with("WebFeatureID", &self.web_feature_id)
            .with("ChromiumHistogramEnumValueID", &self.enum_value_id)
    }
}

pub struct FeatureEnumValueMapper;

impl TableMapper for FeatureEnumValueMapper {
    fn table() -> &'static str {
        FEATURE_ENUM_VALUES_TABLE
    }
}

impl SelectOneMapper for FeatureEnumValueMapper {
    /// Web feature id
    type Key = String;

    fn select_one(web_feature_id: &String) -> Statement {
        Select::from_table(FEATURE_ENUM_VALUES_TABLE)
            .filter_eq("WebFeatureID", web_feature_id)
            .limit(1)
            .into()
    }
}

impl ExternalKeyMapper for FeatureEnumValueMapper {
    type External = FeatureEnumValue;

    fn key_from_external(mapping: &FeatureEnumValue) -> String {
        mapping.web_feature_id.clone()
    }
}

impl StoredMapper for FeatureEnumValueMapper {
    type Stored = FeatureEnumValue;

    fn key_columns() -> &'static [&'static str] {
        &["WebFeatureID"]
    }

    fn to_stored(mapping: &FeatureEnumValue) -> FeatureEnumValue {
        mapping.clone()
    }
}

impl MergeMapper for FeatureEnumValueMapper {
    fn merge(mapping: &FeatureEnumValue, _existing: FeatureEnumValue) -> FeatureEnumValue {
        mapping.clone()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyMetric {
    pub enum_value_id: String,
    pub day: NaiveDate,
    pub rate: f64,
}

impl FromRow for DailyMetric {
    fn from_row(row: &Row) -> featuredb_engine::Result<Self> {
        Ok(Self {
            enum_value_id: row.try_get("ChromiumHistogramEnumValueID")?,
            day: row.try_get("Day")?,
            rate: row.try_get("Rate")?,
        })
    }
}

impl ToRow for DailyMetric {
    fn to_row(&self) -> Row {
        Row::new()
            .with("ChromiumHistogramEnumValueID", &self.enum_value_id)
            .with("Day", self.day)
            .with("Rate", self.rate)
    }
}

pub struct DailyMetricMapper;

impl TableMapper for DailyMetricMapper {
    fn table() -> &'static str {
        DAILY_METRICS_TABLE
    }
}

impl SelectOneMapper for DailyMetricMapper {
    /// (enum value id, day)
    type Key = (String, NaiveDate);

    fn select_one((enum_value_id, day): &(String, NaiveDate)) -> Statement {
        Select::from_table(DAILY_METRICS_TABLE)
            .filter_eq("ChromiumHistogramEnumValueID", enum_value_id)
            .filter_eq("Day", *day)
            .limit(1)
            .into()
    }
}

impl ExternalKeyMapper for DailyMetricMapper {
    type External = DailyMetric;

    fn key_from_external(metric: &DailyMetric) -> (String, NaiveDate) {
        (metric.enum_value_id.clone(), metric.day)
    }
}

impl StoredMapper for DailyMetricMapper {
    type Stored = DailyMetric;

    fn key_columns() -> &'static [&'static str] {
        &["ChromiumHistogramEnumValueID", "Day"]
    }

    fn to_stored(metric: &DailyMetric) -> DailyMetric {
        metric.clone()
    }
}

impl MergeMapper for DailyMetricMapper {
    fn merge(metric: &DailyMetric, existing: DailyMetric) -> DailyMetric {
        DailyMetric {
            rate: metric.rate,
            ..existing
        }
    }
}

/// Most recent day with a metric for one enum value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestDailyMetric {
    pub enum_value_id: String,
    pub day: NaiveDate,
}

impl FromRow for LatestDailyMetric {
    fn from_row(row: &Row) -> featuredb_engine::Result<Self> {
        Ok(Self {
            enum_value_id: row.try_get("ChromiumHistogramEnumValueID")?,
            day: row.try_get("Day")?,
        })
    }
}

impl ToRow for LatestDailyMetric {
    fn to_row(&self) -> Row {
        Row::new()
            .with("ChromiumHistogramEnumValueID", &self.enum_value_id)
            .with("Day", self.day)
    }
}

pub struct LatestDailyMetricMapper;

impl TableMapper for LatestDailyMetricMapper {
    fn table() -> &'static str {
        LATEST_METRICS_TABLE
    }
}

impl SelectOneMapper for LatestDailyMetricMapper {
    /// Enum value id
    type Key = String;

    fn select_one(enum_value_id: &String) -> Statement {
        Select::from_table(LATEST_METRICS_TABLE)
            .filter_eq("ChromiumHistogramEnumValueID", enum_value_id)
            .limit(1)
            .into()
    }
}

impl ExternalKeyMapper for LatestDailyMetricMapper {
    type External = LatestDailyMetric;

    fn key_from_external(latest: &LatestDailyMetric) -> String {
        latest.enum_value_id.clone()
    }
}

impl StoredMapper for LatestDailyMetricMapper {
    type Stored = LatestDailyMetric;

    fn key_columns() -> &'static [&'static str] {
        &["ChromiumHistogramEnumValueID"]
    }

    fn to_stored(latest: &LatestDailyMetric) -> LatestDailyMetric {
        latest.clone()
    }
}

impl MergeMapper for LatestDailyMetricMapper {
    /// Backfilling an older day never moves the latest day back.
    fn merge(latest: &LatestDailyMetric, existing: LatestDailyMetric) -> LatestDailyMetric {
        LatestDailyMetric {
            day: latest.day.max(existing.day),
            ..existing
        }
    }
}

impl Client {
    pub async fn upsert_chromium_histogram_enum(
        &self,
        histogram_name: &str,
    ) -> StoreResult<String> {
        upsert_and_get_id::<HistogramEnumMapper>(self.db(), &histogram_name.to_string()).await
    }

    pub async fn upsert_chromium_histogram_enum_value(
        &self,
        value: &HistogramEnumValue,
    ) -> StoreResult<String> {
        upsert_and_get_id::<HistogramEnumValueMapper>(self.db(), value).await
    }

    /// Point a feature at the histogram bucket that measures it.
    pub async fn upsert_web_feature_chromium_histogram_enum_value(
        &self,
        feature_key: &str,
        enum_value_id: &str,
    ) -> StoreResult<()> {
        let mapping = FeatureEnumValue {
            web_feature_id: self.get_web_feature_id(feature_key).await?,
            enum_value_id: enum_value_id.to_string(),
        };
        upsert::<FeatureEnumValueMapper>(self.db(), &mapping).await
    }

    /// Store one day's rate for a histogram bucket and advance the bucket's
    /// latest day, in one transaction.
    pub async fn upsert_daily_chromium_histogram_metric(
        &self,
        histogram_name: &str,
        bucket_id: i64,
        day: NaiveDate,
        rate: f64,
    ) -> StoreResult<()> {
        let histogram_name = histogram_name.to_string();
        read_write(self.db(), move |txn| {
            let histogram_name = histogram_name.clone();
            Box::pin(async move {
                let histogram: StoredHistogramEnum =
                    read_one_in(txn, &HistogramEnumMapper::select_one(&histogram_name)).await?;
                let value: StoredHistogramEnumValue = read_one_in(
                    txn,
                    &HistogramEnumValueMapper::select_one(&(histogram.id, bucket_id)),
                )
                .await?;

                let metric = DailyMetric {
                    enum_value_id: value.id.clone(),
                    day,
                    rate,
                };
                upsert_in::<DailyMetricMapper>(txn, &metric).await?;
                let latest = LatestDailyMetric {
                    enum_value_id: value.id,
                    day,
                };
                upsert_in::<LatestDailyMetricMapper>(txn, &latest).await
            })
        })
        .await
    }

    /// Daily rates for a feature's bucket of `histogram_name`, newest first.
    pub async fn list_chromium_histogram_metrics(
        &self,
        params: &HistogramMetricParams,
        page_size: i64,
        page_token: Option<&str>,
    ) -> StoreResult<Page<DailyHistogramMetric>> {
        list::<HistogramMetricMapper>(self.db(), params, page_size, page_token).await
    }
}
