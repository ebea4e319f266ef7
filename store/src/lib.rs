//! # featuredb store
//!
//! Data-access layer for the web-platform feature-tracking service.
//!
//! Tables are described once through the mapper traits in
//! [`featuredb_engine::mapper`]. The generic operations in [`entity`] then
//! read, upsert, remove, create, page and synchronize any of them without
//! per-table transaction plumbing.
//!
//! ## Layers
//!
//! - [`db`]: the [`Database`] abstraction with PostgreSQL and in-memory
//!   backends, plus [`db::read_write`] for retried serializable
//!   transactions
//! - [`entity`]: generic operations and the concurrent [`BatchWriter`]
//! - [`tables`]: concrete tables and the [`Client`] methods built on them
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use featuredb_store::tables::web_features::WebFeature;
//! use featuredb_store::{Client, Config};
//!
//! # async fn run() -> featuredb_store::StoreResult<()> {
//! let config = Config::from_env().expect("DATABASE_URL is set");
//! let client = Client::connect(&config).await?;
//!
//! let id = client
//!     .upsert_web_feature(&WebFeature {
//!         feature_key: "grid".into(),
//!         name: "Grid".into(),
//!         description: String::new(),
//!         description_html: String::new(),
//!     })
//!     .await?;
//! println!("grid is stored as {id}");
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod tables;

pub use client::{Client, WriteSettings};
pub use config::{Config, ConfigError};
pub use db::{Database, MemoryDatabase, PostgresDatabase, TableDef, Transaction};
pub use entity::{BatchWriter, ChildDeleteMapper, Page, SyncReport};
pub use error::{ErrorKind, StoreError, StoreResult, SyncPhase};
pub use tables::schema;
