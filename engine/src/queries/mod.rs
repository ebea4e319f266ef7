//! Hand-written aggregate queries.
//!
//! These are too involved for the structured [`Select`](crate::statement::Select)
//! builder, so each is a PostgreSQL template with `@name` parameters. Every
//! query is exposed as a [`ListMapper`](crate::mapper::ListMapper) so the
//! generic lister pages through it like any other table.
//!
//! All templates refer to tables by their quoted PascalCase names.

pub mod browser_feature_count;
pub mod histogram;
pub mod missing_one_impl;

pub use browser_feature_count::{
    BrowserFeatureCountMapper, BrowserFeatureCountParams, BrowserReleaseFeatureCount,
};
pub use histogram::{DailyHistogramMetric, HistogramMetricMapper, HistogramMetricParams};
pub use missing_one_impl::{MissingOneImplCount, MissingOneImplMapper, MissingOneImplParams};
