//! Integration tests against PostgreSQL.
//!
//! These tests require a running PostgreSQL database.
//! Set DATABASE_URL environment variable before running, then run with
//! `--ignored`.

use chrono::{TimeZone, Utc};
use featuredb_store::db::{create_pool, run_migrations};
use featuredb_store::tables::browser_releases::BrowserRelease;
use featuredb_store::tables::saved_searches::CreateSavedSearchRequest;
use featuredb_store::tables::web_features::WebFeature;
use featuredb_store::{Client, Config, ErrorKind};

async fn connect() -> Client {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("DATABASE_URL must be set");
    let pool = create_pool(&config).await.unwrap();
    run_migrations(&pool).await.unwrap();
    Client::connect(&config).await.unwrap()
}

fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4())
}

#[tokio::test]
#[ignore]
async fn test_feature_round_trip() {
    let client = connect().await;
    let key = unique("feature");
    let feature = WebFeature {
        feature_key: key.clone(),
        name: "Test feature".into(),
        description: "Only in tests".into(),
        description_html: String::new(),
    };

    let id = client.upsert_web_feature(&feature).await.unwrap();
    assert_eq!(client.upsert_web_feature(&feature).await.unwrap(), id);

    client
        .upsert_browser_feature_availability(&key, "chrome", "120")
        .await
        .unwrap();
    client
        .upsert_browser_feature_availability(&key, "chrome", "121")
        .await
        .unwrap();
    let availability = client.list_browser_feature_availabilities(&key).await.unwrap();
    assert_eq!(availability.len(), 1);
    assert_eq!(availability[0].browser_version, "121");

    client.delete_web_feature(&key).await.unwrap();
    let err = client.get_web_feature(&key).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
#[ignore]
async fn test_release_upsert_updates_date() {
    let client = connect().await;
    let browser = unique("browser");
    let mut release = BrowserRelease {
        browser_name: browser.clone(),
        browser_version: "1".into(),
        release_date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    };
    client.upsert_browser_release(&release).await.unwrap();

    release.release_date = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
    client.upsert_browser_release(&release).await.unwrap();

    let stored = client.get_browser_release(&browser, "1").await.unwrap();
    assert_eq!(stored, release);
}

#[tokio::test]
#[ignore]
async fn test_saved_search_owner_flow() {
    let client = connect().await;
    let owner = unique("user");
    let id = client
        .create_new_user_saved_search(CreateSavedSearchRequest {
            name: "Baseline widely available".into(),
            description: None,
            query: "baseline_status:widely".into(),
            owner_user_id: owner.clone(),
        })
        .await
        .unwrap();

    let search = client
        .get_user_saved_search(&id, Some(&owner))
        .await
        .unwrap();
    assert_eq!(search.is_bookmarked, Some(true));

    let err = client
        .delete_user_saved_search(&id, &unique("stranger"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingRequiredRole);

    client.delete_user_saved_search(&id, &owner).await.unwrap();
}
