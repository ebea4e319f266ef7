//! Chromium histogram daily metrics for one feature.

use crate::cursor::DayCursor;
use crate::error::Result;
use crate::mapper::{ListMapper, TableMapper};
use crate::row::{FromRow, Row};
use crate::statement::Statement;
use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct HistogramMetricParams {
    pub feature_key: String,
    pub histogram_name: String,
    /// Inclusive first day
    pub start_at: NaiveDate,
    /// Exclusive last day
    pub end_at: NaiveDate,
}

/// Usage rate recorded for a day.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyHistogramMetric {
    pub day: NaiveDate,
    pub rate: f64,
}

impl FromRow for DailyHistogramMetric {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            day: row.try_get("Day")?,
            rate: row.try_get("Rate")?,
        })
    }
}

/// Lists metrics newest day first.
pub struct HistogramMetricMapper;

impl TableMapper for HistogramMetricMapper {
    fn table() -> &'static str {
        "DailyChromiumHistogramMetrics"
    }
}

impl ListMapper for HistogramMetricMapper {
    type Params = HistogramMetricParams;
    type Cursor = DayCursor;
    type Item = DailyHistogramMetric;

    fn select_page(
        params: &Self::Params,
        cursor: Option<&Self::Cursor>,
        limit: i64,
    ) -> Statement {
        let cursor_filter = match cursor {
            Some(_) => r#"AND dchm."Day" < @last_day"#,
            None => "",
        };
        let sql = format!(
            r#"SELECT dchm."Day", dchm."Rate"
FROM "WebFeatures" wf
JOIN "WebFeatureChromiumHistogramEnumValues" wfchev
    ON wfchev."WebFeatureID" = wf."ID"
JOIN "ChromiumHistogramEnumValues" chev
    ON chev."ID" = wfchev."ChromiumHistogramEnumValueID"
JOIN "ChromiumHistogramEnums" che
    ON che."ID" = chev."ChromiumHistogramEnumID"
JOIN "DailyChromiumHistogramMetrics" dchm
    ON dchm."ChromiumHistogramEnumValueID" = chev."ID"
WHERE wf."FeatureKey" = @feature_key
    AND che."HistogramName" = @histogram_name
    AND dchm."Day" >= @start_at
    AND dchm."Day" < @end_at
    {cursor_filter}
ORDER BY dchm."Day" DESC
LIMIT @page_size"#
        );

        let mut statement = Statement::raw(sql)
            .bind("feature_key", &params.feature_key)
            .bind("histogram_name", &params.histogram_name)
            .bind("start_at", params.start_at)
            .bind("end_at", params.end_at)
            .bind("page_size", limit);
        if let Some(cursor) = cursor {
            statement = statement.bind("last_day", cursor.last_day);
        }
        statement
    }

    fn next_cursor(
        _params: &Self::Params,
        _previous: Option<&Self::Cursor>,
        page: &[Self::Item],
    ) -> Option<Self::Cursor> {
        page.last().map(|last| DayCursor { last_day: last.day })
    }
}
