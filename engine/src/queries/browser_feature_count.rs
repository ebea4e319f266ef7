//! Cumulative count of features available in a browser, per release.

use crate::cursor::ReleaseCountCursor;
use crate::error::Result;
use crate::mapper::{ListMapper, TableMapper};
use crate::row::{FromRow, Row};
use crate::statement::Statement;
use chrono::{DateTime, Utc};

const FIRST_AVAILABILITY_CTE: &str = r#"WITH first_availability AS (
    SELECT bfa."WebFeatureID", MIN(br."ReleaseDate") AS "FirstReleaseDate"
    FROM "BrowserFeatureAvailabilities" bfa
    JOIN "BrowserReleases" br
        ON br."BrowserName" = bfa."BrowserName"
        AND br."BrowserVersion" = bfa."BrowserVersion"
    WHERE bfa."BrowserName" = @browser_name
    GROUP BY bfa."WebFeatureID"
)"#;

const FIRST_PAGE_COUNT: &str = r#"(
        SELECT COUNT(*) FROM first_availability fa
        WHERE fa."FirstReleaseDate" <= br."ReleaseDate"
    )"#;

// Later pages resume from the cursor's running total instead of recounting
// every feature shipped before the window.
const NEXT_PAGE_COUNT: &str = r#"@last_cumulative_count + (
        SELECT COUNT(*) FROM first_availability fa
        WHERE fa."FirstReleaseDate" > @last_release_date
        AND fa."FirstReleaseDate" <= br."ReleaseDate"
    )"#;

/// Parameters for the browser feature count metric.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowserFeatureCountParams {
    pub browser_name: String,
    /// Inclusive lower bound on release date
    pub start_at: DateTime<Utc>,
    /// Exclusive upper bound on release date
    pub end_at: DateTime<Utc>,
}

/// One release and the number of features available as of that release.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowserReleaseFeatureCount {
    pub release_date: DateTime<Utc>,
    pub browser_version: String,
    pub feature_count: i64,
}

impl FromRow for BrowserReleaseFeatureCount {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            release_date: row.try_get("ReleaseDate")?,
            browser_version: row.try_get("BrowserVersion")?,
            feature_count: row.try_get("FeatureCount")?,
        })
    }
}

pub struct BrowserFeatureCountMapper;

impl TableMapper for BrowserFeatureCountMapper {
    fn table() -> &'static str {
        "BrowserReleases"
    }
}

impl ListMapper for BrowserFeatureCountMapper {
    type Params = BrowserFeatureCountParams;
    type Cursor = ReleaseCountCursor;
    type Item = BrowserReleaseFeatureCount;

    fn select_page(
        params: &Self::Params,
        cursor: Option<&Self::Cursor>,
        limit: i64,
    ) -> Statement {
        let (count_expr, cursor_filter) = match cursor {
            Some(_) => (
                NEXT_PAGE_COUNT,
                r#"AND (br."ReleaseDate", br."BrowserVersion") > (@last_release_date, @last_browser_version)"#,
            ),
            None => (FIRST_PAGE_COUNT, ""),
        };

        let sql = format!(
            r#"{cte}
SELECT br."ReleaseDate", br."BrowserVersion", {count_expr} AS "FeatureCount"
FROM "BrowserReleases" br
WHERE br."BrowserName" = @browser_name
    AND br."ReleaseDate" >= @start_at
    AND br."ReleaseDate" < @end_at
    {cursor_filter}
ORDER BY br."ReleaseDate" ASC, br."BrowserVersion" ASC
LIMIT @page_size"#,
            cte = FIRST_AVAILABILITY_CTE,
        );

        let mut statement = Statement::raw(sql)
            .bind("browser_name", &params.browser_name)
            .bind("start_at", params.start_at)
            .bind("end_at", params.end_at)
            .bind("page_size", limit);
        if let Some(cursor) = cursor {
            statement = statement
                .bind("last_release_date", cursor.last_release_date)
                .bind("last_browser_version", &cursor.last_browser_version)
                .bind("last_cumulative_count", cursor.last_cumulative_count);
        }
        statement
    }

    fn next_cursor(
        _params: &Self::Params,
        _previous: Option<&Self::Cursor>,
        page: &[Self::Item],
    ) -> Option<Self::Cursor> {
        page.last().map(|last| ReleaseCountCursor {
            last_release_date: last.release_date,
            last_browser_version: last.browser_version.clone(),
            last_cumulative_count: last.feature_count,
        })
    }
}
