//! Aggregate feature counts over browser releases.

use crate::client::Client;
use crate::entity::{list, Page};
use crate::error::StoreResult;
use featuredb_engine::queries::{
    BrowserFeatureCountMapper, BrowserFeatureCountParams, BrowserReleaseFeatureCount,
    MissingOneImplCount, MissingOneImplMapper, MissingOneImplParams,
};

impl Client {
    /// Cumulative number of features available in a browser at each of its
    /// releases in the window, oldest release first.
    pub async fn list_browser_feature_count_metric(
        &self,
        params: &BrowserFeatureCountParams,
        page_size: i64,
        page_token: Option<&str>,
    ) -> StoreResult<Page<BrowserReleaseFeatureCount>> {
        list::<BrowserFeatureCountMapper>(self.db(), params, page_size, page_token).await
    }

    /// Per release date, the number of features every other browser has
    /// shipped but the target browser has not.
    pub async fn list_missing_one_implementation_counts(
        &self,
        params: &MissingOneImplParams,
        page_size: i64,
        page_token: Option<&str>,
    ) -> StoreResult<Page<MissingOneImplCount>> {
        list::<MissingOneImplMapper>(self.db(), params, page_size, page_token).await
    }
}
