//! Client handle shared by every table operation.

use crate::config::{Config, DEFAULT_BATCH_SIZE, DEFAULT_BATCH_WRITERS};
use crate::db::{self, Database, PostgresDatabase};
use crate::entity::BatchWriter;
use crate::error::{StoreError, StoreResult};
use std::sync::Arc;

/// Tuning for bulk writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSettings {
    batch_size: usize,
    batch_writers: usize,
    batch_write_threshold: Option<usize>,
}

impl Default for WriteSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_writers: DEFAULT_BATCH_WRITERS,
            batch_write_threshold: None,
        }
    }
}

impl WriteSettings {
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn batch_writers(&self) -> usize {
        self.batch_writers
    }

    /// Upsert count at which a sync stops writing atomically.
    ///
    /// Follows the batch size unless set explicitly.
    pub fn batch_write_threshold(&self) -> usize {
        self.batch_write_threshold.unwrap_or(self.batch_size)
    }
}

/// Entry point to the data-access layer.
#[derive(Clone)]
pub struct Client {
    db: Arc<dyn Database>,
    settings: WriteSettings,
}

impl Client {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            db,
            settings: WriteSettings::default(),
        }
    }

    /// Connect to PostgreSQL using `config`.
    pub async fn connect(config: &Config) -> StoreResult<Self> {
        let pool = db::create_pool(config).await?;
        let mut database = PostgresDatabase::new(pool);
        if let Some(limit) = config.mutation_limit {
            database = database.with_mutation_limit(limit);
        }

        let mut client = Client::new(Arc::new(database))
            .with_batch_size(config.batch_size)?
            .with_batch_writers(config.batch_writers)?;
        if let Some(threshold) = config.batch_write_threshold {
            client = client.with_batch_write_threshold(threshold)?;
        }
        tracing::info!(
            batch_size = client.settings.batch_size,
            batch_writers = client.settings.batch_writers,
            batch_write_threshold = client.settings.batch_write_threshold(),
            "Connected to database"
        );
        Ok(client)
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> StoreResult<Self> {
        if batch_size == 0 {
            return Err(StoreError::BadClientConfig(
                "batch size must be positive".into(),
            ));
        }
        self.settings.batch_size = batch_size;
        Ok(self)
    }

    pub fn with_batch_writers(mut self, batch_writers: usize) -> StoreResult<Self> {
        if batch_writers == 0 {
            return Err(StoreError::BadClientConfig(
                "batch writer count must be positive".into(),
            ));
        }
        self.settings.batch_writers = batch_writers;
        Ok(self)
    }

    pub fn with_batch_write_threshold(mut self, threshold: usize) -> StoreResult<Self> {
        if threshold == 0 {
            return Err(StoreError::BadClientConfig(
                "batch write threshold must be positive".into(),
            ));
        }
        self.settings.batch_write_threshold = Some(threshold);
        Ok(self)
    }

    pub fn db(&self) -> &dyn Database {
        self.db.as_ref()
    }

    pub fn settings(&self) -> WriteSettings {
        self.settings
    }

    /// Batch writer using this client's settings.
    pub fn batch_writer(&self) -> BatchWriter {
        BatchWriter::new(
            self.db.clone(),
            self.settings.batch_size,
            self.settings.batch_writers,
        )
    }
}
