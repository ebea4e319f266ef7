//! Backend error type.

/// Errors reported by a [`Database`](super::Database) backend.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("row already exists in {table}")]
    AlreadyExists { table: String },

    #[error("row not found in {table}")]
    NotFound { table: String },

    /// The transaction lost a serialization conflict and may be retried.
    #[error("transaction aborted: {0}")]
    Aborted(String),

    #[error("commit touches {count} rows, limit is {limit}")]
    MutationLimitExceeded { count: usize, limit: usize },

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("unsupported statement: {0}")]
    Unsupported(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("database unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Engine error: {0}")]
    Engine(#[from] featuredb_engine::Error),
}

/// Result type for backend calls.
pub type DbResult<T> = std::result::Result<T, DbError>;
