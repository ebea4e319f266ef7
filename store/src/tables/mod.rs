//! Concrete tables.
//!
//! Each module defines a table's stored structs, its mappers and the
//! [`Client`](crate::Client) methods callers use. Table and column names
//! match `migrations/`.

pub mod browser_feature_availabilities;
pub mod browser_releases;
pub mod chromium_histograms;
pub mod feature_baseline_status;
pub mod feature_counts;
pub mod notification_channels;
pub mod saved_searches;
pub mod subscriptions;
pub mod web_features;

use crate::db::TableDef;

/// Table layout for the in-memory backend, mirroring the migrations.
pub fn schema() -> Vec<TableDef> {
    vec![
        TableDef::new(web_features::TABLE, &["ID"]).unique(&["FeatureKey"]),
        TableDef::new(browser_releases::TABLE, &["BrowserName", "BrowserVersion"]),
        TableDef::new(
            browser_feature_availabilities::TABLE,
            &["WebFeatureID", "BrowserName", "BrowserVersion"],
        )
        .unique(&["WebFeatureID", "BrowserName"])
        .child_of(web_features::TABLE, &[("WebFeatureID", "ID")]),
        TableDef::new(feature_baseline_status::TABLE, &["WebFeatureID"])
            .child_of(web_features::TABLE, &[("WebFeatureID", "ID")]),
        TableDef::new(saved_searches::TABLE, &["ID"]),
        TableDef::new(saved_searches::ROLES_TABLE, &["SavedSearchID", "UserID"])
            .child_of(saved_searches::TABLE, &[("SavedSearchID", "ID")]),
        TableDef::new(saved_searches::BOOKMARKS_TABLE, &["SavedSearchID", "UserID"])
            .child_of(saved_searches::TABLE, &[("SavedSearchID", "ID")]),
        TableDef::new(notification_channels::TABLE, &["ID"]),
        TableDef::new(subscriptions::TABLE, &["ID"])
            .child_of(notification_channels::TABLE, &[("ChannelID", "ID")])
            .child_of(saved_searches::TABLE, &[("SavedSearchID", "ID")]),
        TableDef::new(chromium_histograms::ENUMS_TABLE, &["ID"]).unique(&["HistogramName"]),
        TableDef::new(chromium_histograms::ENUM_VALUES_TABLE, &["ID"])
            .unique(&["ChromiumHistogramEnumID", "BucketID"])
            .child_of(
                chromium_histograms::ENUMS_TABLE,
                &[("ChromiumHistogramEnumID", "ID")],
            ),
        TableDef::new(chromium_histograms::FEATURE_ENUM_VALUES_TABLE, &["WebFeatureID"])
            .child_of(web_features::TABLE, &[("WebFeatureID", "ID")])
            .child_of(
                chromium_histograms::ENUM_VALUES_TABLE,
                &[("ChromiumHistogramEnumValueID", "ID")],
            ),
        TableDef::new(
            chromium_histograms::DAILY_METRICS_TABLE,
            &["ChromiumHistogramEnumValueID", "Day"],
        )
        .child_of(
            chromium_histograms::ENUM_VALUES_TABLE,
            &[("ChromiumHistogramEnumValueID", "ID")],
        ),
        TableDef::new(
            chromium_histograms::LATEST_METRICS_TABLE,
            &["ChromiumHistogramEnumValueID"],
        )
        .child_of(
            chromium_histograms::ENUM_VALUES_TABLE,
            &[("ChromiumHistogramEnumValueID", "ID")],
        ),
    ]
}
