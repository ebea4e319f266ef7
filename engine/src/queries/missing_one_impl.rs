//! Features implemented everywhere except one browser, per release.
//!
//! For each release date of any listed browser, counts the features that
//! every "other" browser had shipped by that date while the target browser
//! had not.

use crate::cursor::ReleaseDateCursor;
use crate::error::{Error, Result};
use crate::mapper::{ListMapper, TableMapper};
use crate::row::{FromRow, Row};
use crate::statement::Statement;
use chrono::{DateTime, Utc};

/// Parameters for the missing-one-implementation counts.
///
/// Built through [`MissingOneImplParams::new`], which rejects an empty list
/// of other browsers.
#[derive(Debug, Clone, PartialEq)]
pub struct MissingOneImplParams {
    target_browser: String,
    other_browsers: Vec<String>,
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
}

impl MissingOneImplParams {
    pub fn new(
        target_browser: impl Into<String>,
        other_browsers: Vec<String>,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Result<Self> {
        let target_browser = target_browser.into();
        if other_browsers.is_empty() {
            return Err(Error::InvalidInput(
                "missing one implementation query needs at least one other browser".into(),
            ));
        }
        if other_browsers.contains(&target_browser) {
            return Err(Error::InvalidInput(format!(
                "target browser {} also listed as other browser",
                target_browser
            )));
        }
        Ok(Self {
            target_browser,
            other_browsers,
            start_at,
            end_at,
        })
    }

    pub fn target_browser(&self) -> &str {
        &self.target_browser
    }

    pub fn other_browsers(&self) -> &[String] {
        &self.other_browsers
    }
}

/// One release date and the number of features missing only in the target.
#[derive(Debug, Clone, PartialEq)]
pub struct MissingOneImplCount {
    pub release_date: DateTime<Utc>,
    pub count: i64,
}

impl FromRow for MissingOneImplCount {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            release_date: row.try_get("ReleaseDate")?,
            count: row.try_get("Count")?,
        })
    }
}

pub struct MissingOneImplMapper;

impl TableMapper for MissingOneImplMapper {
    fn table() -> &'static str {
        "BrowserFeatureAvailabilities"
    }
}

fn shipped_by(browser_param: &str) -> String {
    format!(
        r#"EXISTS (
            SELECT 1 FROM availability ad
            WHERE ad."WebFeatureID" = wf."ID"
                AND ad."BrowserName" = @{browser_param}
                AND ad."AvailableAt" <= rd."ReleaseDate"
        )"#
    )
}

impl ListMapper for MissingOneImplMapper {
    type Params = MissingOneImplParams;
    type Cursor = ReleaseDateCursor;
    type Item = MissingOneImplCount;

    fn select_page(
        params: &Self::Params,
        cursor: Option<&Self::Cursor>,
        limit: i64,
    ) -> Statement {
        let other_params: Vec<String> = (0..params.other_browsers.len())
            .map(|i| format!("other_browser_{}", i))
            .collect();
        let browser_list = std::iter::once("@target_browser".to_string())
            .chain(other_params.iter().map(|p| format!("@{}", p)))
            .collect::<Vec<_>>()
            .join(", ");
        let others_shipped = other_params
            .iter()
            .map(|p| shipped_by(p))
            .collect::<Vec<_>>()
            .join("\n        AND ");
        let cursor_filter = match cursor {
            Some(_) => r#"AND br."ReleaseDate" > @last_release_date"#,
            None => "",
        };

        let sql = format!(
            r#"WITH availability AS (
    SELECT bfa."WebFeatureID", bfa."BrowserName", MIN(br."ReleaseDate") AS "AvailableAt"
    FROM "BrowserFeatureAvailabilities" bfa
    JOIN "BrowserReleases" br
        ON br."BrowserName" = bfa."BrowserName"
        AND br."BrowserVersion" = bfa."BrowserVersion"
    WHERE bfa."BrowserName" IN ({browser_list})
    GROUP BY bfa."WebFeatureID", bfa."BrowserName"
),
release_dates AS (
    SELECT DISTINCT br."ReleaseDate"
    FROM "BrowserReleases" br
    WHERE br."BrowserName" IN ({browser_list})
        AND br."ReleaseDate" >= @start_at
        AND br."ReleaseDate" < @end_at
        {cursor_filter}
)
SELECT rd."ReleaseDate", (
    SELECT COUNT(*) FROM "WebFeatures" wf
    WHERE NOT {target_shipped}
        AND {others_shipped}
) AS "Count"
FROM release_dates rd
ORDER BY rd."ReleaseDate" ASC
LIMIT @page_size"#,
            target_shipped = shipped_by("target_browser"),
        );

        let mut statement = Statement::raw(sql)
            .bind("target_browser", &params.target_browser)
            .bind("start_at", params.start_at)
            .bind("end_at", params.end_at)
            .bind("page_size", limit);
        for (name, browser) in other_params.iter().zip(&params.other_browsers) {
            statement = statement.bind(name.as_str(), browser);
        }
        if let Some(cursor) = cursor {
            statement = statement.bind("last_release_date", cursor.last_release_date);
        }
        statement
    }

    fn next_cursor(
        _params: &Self::Params,
        _previous: Option<&Self::Cursor>,
        page: &[Self::Item],
    ) -> Option<Self::Cursor> {
        page.last().map(|last| ReleaseDateCursor {
            last_release_date: last.release_date,
        })
    }
}
