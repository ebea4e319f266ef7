//! Baseline status per feature.

use crate::client::Client;
use crate::entity::{read_row_by_key, upsert};
use crate::error::StoreResult;
use chrono::NaiveDate;
use featuredb_engine::{
    Error, ExternalKeyMapper, FromRow, MergeMapper, OptionallySet, Row, Select, SelectOneMapper,
    Statement, StoredMapper, TableMapper, ToRow,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const TABLE: &str = "FeatureBaselineStatus";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaselineStatus {
    None,
    Low,
    High,
}

impl BaselineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BaselineStatus::None => "none",
            BaselineStatus::Low => "low",
            BaselineStatus::High => "high",
        }
    }
}

impl fmt::Display for BaselineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BaselineStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(BaselineStatus::None),
            "low" => Ok(BaselineStatus::Low),
            "high" => Ok(BaselineStatus::High),
            other => Err(Error::InvalidValue {
                column: "Status".into(),
                reason: format!("unknown baseline status {other:?}"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureBaselineStatus {
    pub web_feature_id: String,
    pub status: Option<BaselineStatus>,
    pub low_date: Option<NaiveDate>,
    pub high_date: Option<NaiveDate>,
}

impl FromRow for FeatureBaselineStatus {
    fn from_row(row: &Row) -> featuredb_engine::Result<Self> {
        let status: Option<String> = row.try_get("Status")?;
        Ok(Self {
            web_feature_id: row.try_get("WebFeatureID")?,
            status: status.as_deref().map(str::parse::<BaselineStatus>).transpose()?,
            low_date: row.try_get("LowDate")?,
            high_date: row.try_get("HighDate")?,
        })
    }
}

impl ToRow for FeatureBaselineStatus {
    fn to_row(&self) -> Row {
        Row::new()
            .with("WebFeatureID", &self.web_feature_id)
            .with("Status", self.status.map(|s| s.as_str()))
            .with("LowDate", self.low_date)
            .with("HighDate", self.high_date)
    }
}

/// Partial update of a feature's baseline status. Unset fields keep their
/// stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BaselineStatusUpdate {
    pub status: OptionallySet<Option<BaselineStatus>>,
    pub low_date: OptionallySet<Option<NaiveDate>>,
    pub high_date: OptionallySet<Option<NaiveDate>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureBaselineStatusUpsert {
    pub web_feature_id: String,
    pub update: BaselineStatusUpdate,
}

pub struct FeatureBaselineStatusMapper;

impl TableMapper for FeatureBaselineStatusMapper {
    fn table() -> &'static str {
        TABLE
    }
}

impl SelectOneMapper for FeatureBaselineStatusMapper {
    type Key = String;

    fn select_one(web_feature_id: &String) -> Statement {
        Select::from_table(TABLE)
            .filter_eq("WebFeatureID", web_feature_id)
            .limit(1)
            .into()
    }
}

impl ExternalKeyMapper for FeatureBaselineStatusMapper {
    type External = FeatureBaselineStatusUpsert;

    fn key_from_external(external: &FeatureBaselineStatusUpsert) -> String {
        external.web_feature_id.clone()
    }
}

impl StoredMapper for FeatureBaselineStatusMapper {
    type Stored = FeatureBaselineStatus;

    fn key_columns() -> &'static [&'static str] {
        &["WebFeatureID"]
    }

    fn to_stored(external: &FeatureBaselineStatusUpsert) -> FeatureBaselineStatus {
        let update = &external.update;
        FeatureBaselineStatus {
            web_feature_id: external.web_feature_id.clone(),
            status: update.status.as_ref().copied().flatten(),
            low_date: update.low_date.as_ref().copied().flatten(),
            high_date: update.high_date.as_ref().copied().flatten(),
        }
    }
}

impl MergeMapper for FeatureBaselineStatusMapper {
    fn merge(
        external: &FeatureBaselineStatusUpsert,
        mut existing: FeatureBaselineStatus,
    ) -> FeatureBaselineStatus {
        let update = &external.update;
        update.status.apply_to(&mut existing.status);
        update.low_date.apply_to(&mut existing.low_date);
        update.high_date.apply_to(&mut existing.high_date);
        existing
    }
}

impl Client {
    pub async fn upsert_feature_baseline_status(
        &self,
        feature_key: &str,
        update: BaselineStatusUpdate,
    ) -> StoreResult<()> {
        let input = FeatureBaselineStatusUpsert {
            web_feature_id: self.get_web_feature_id(feature_key).await?,
            update,
        };
        upsert::<FeatureBaselineStatusMapper>(self.db(), &input).await
    }

    pub async fn get_feature_baseline_status(
        &self,
        feature_key: &str,
    ) -> StoreResult<FeatureBaselineStatus> {
        let id = self.get_web_feature_id(feature_key).await?;
        read_row_by_key::<FeatureBaselineStatusMapper>(self.db(), &id).await
    }
}
