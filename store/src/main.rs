//! featuredb - maintenance commands for the feature-tracking database.
//!
//! Runs migrations and loads ingestion output into the database through the
//! same client the service uses.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use featuredb_store::db::{create_pool, run_migrations};
use featuredb_store::tables::browser_releases::BrowserRelease;
use featuredb_store::tables::web_features::WebFeature;
use featuredb_store::{Client, Config};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "featuredb", version, about = "Feature-tracking database maintenance")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply pending schema migrations.
    Migrate,

    /// Replace the feature table with the features in a JSON file.
    SyncFeatures {
        /// JSON array of features
        file: PathBuf,

        /// Override the upsert count at which the sync switches to batches
        #[arg(long, env = "BATCH_WRITE_THRESHOLD")]
        threshold: Option<usize>,
    },

    /// Insert or update a single browser release.
    UpsertRelease {
        #[arg(long)]
        browser: String,

        #[arg(long)]
        version: String,

        /// RFC 3339 release timestamp
        #[arg(long)]
        date: DateTime<Utc>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "featuredb_store=debug,featuredb=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Migrate => {
            let pool = create_pool(&config).await?;
            tracing::info!("Running database migrations...");
            run_migrations(&pool).await?;
            tracing::info!("Migrations complete");
        }
        Command::SyncFeatures { file, threshold } => {
            let raw = tokio::fs::read_to_string(&file).await?;
            let features: Vec<WebFeature> = serde_json::from_str(&raw)?;
            let mut client = Client::connect(&config).await?;
            if let Some(threshold) = threshold {
                client = client.with_batch_write_threshold(threshold)?;
            }

            let interrupted = async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => tracing::warn!("Interrupted, stopping sync"),
                    Err(_) => std::future::pending::<()>().await,
                }
            };
            let report = client
                .sync_web_features_until(&features, interrupted)
                .await?;
            tracing::info!(
                file = %file.display(),
                inserted = report.inserted,
                updated = report.updated,
                deleted = report.deleted,
                "Features synced"
            );
        }
        Command::UpsertRelease {
            browser,
            version,
            date,
        } => {
            let client = Client::connect(&config).await?;
            client
                .upsert_browser_release(&BrowserRelease {
                    browser_name: browser,
                    browser_version: version,
                    release_date: date,
                })
                .await?;
            tracing::info!("Release stored");
        }
    }

    Ok(())
}
