//! Unified error handling for the data-access layer.
//!
//! Every public operation returns [`StoreError`]. Callers branch on
//! [`StoreError::kind`] rather than on variants, so wrapping (for example a
//! batch failure inside a sync phase) never changes what they check for.

use crate::db::DbError;
use std::fmt;

/// Phase of a table sync that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Read,
    MutationCreation,
    ChildMutations,
    AtomicWrite,
    BatchWrite,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            SyncPhase::Read => "read",
            SyncPhase::MutationCreation => "mutation creation",
            SyncPhase::ChildMutations => "child mutation lookup",
            SyncPhase::AtomicWrite => "atomic write",
            SyncPhase::BatchWrite => "batch write",
        };
        f.write_str(phase)
    }
}

/// Flat classification of a [`StoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidCursorFormat,
    InvalidInput,
    InternalQueryFailure,
    MissingRequiredRole,
    OwnerCannotUnbookmark,
    SyncReadFailed,
    SyncMutationCreationFailed,
    SyncFailedToGetChildMutations,
    SyncAtomicWriteFailed,
    SyncBatchWriteFailed,
    Cancelled,
    BadClientConfig,
}

/// Data-access error type.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("query returned no results")]
    QueryReturnedNoResults,

    #[error("invalid cursor format: {0}")]
    InvalidCursorFormat(#[source] featuredb_engine::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("internal query failure: {0}")]
    InternalQueryFailure(#[source] DbError),

    #[error("user does not have the required role")]
    MissingRequiredRole,

    #[error("owner cannot remove their own bookmark")]
    OwnerCannotUnbookmark,

    #[error("sync failed during {phase}: {source}")]
    Sync {
        phase: SyncPhase,
        #[source]
        source: Box<StoreError>,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("batch worker failed: {0}")]
    BatchWorker(#[source] tokio::task::JoinError),

    #[error("bad client config: {0}")]
    BadClientConfig(String),
}

impl StoreError {
    /// Wrap an error as a failure of one sync phase.
    pub fn sync(phase: SyncPhase, source: StoreError) -> Self {
        StoreError::Sync {
            phase,
            source: Box::new(source),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::QueryReturnedNoResults => ErrorKind::NotFound,
            StoreError::InvalidCursorFormat(_) => ErrorKind::InvalidCursorFormat,
            StoreError::InvalidInput(_) => ErrorKind::InvalidInput,
            StoreError::InternalQueryFailure(_) | StoreError::BatchWorker(_) => {
                ErrorKind::InternalQueryFailure
            }
            StoreError::MissingRequiredRole => ErrorKind::MissingRequiredRole,
            StoreError::OwnerCannotUnbookmark => ErrorKind::OwnerCannotUnbookmark,
            StoreError::Sync { phase, .. } => match phase {
                SyncPhase::Read => ErrorKind::SyncReadFailed,
                SyncPhase::MutationCreation => ErrorKind::SyncMutationCreationFailed,
                SyncPhase::ChildMutations => ErrorKind::SyncFailedToGetChildMutations,
                SyncPhase::AtomicWrite => ErrorKind::SyncAtomicWriteFailed,
                SyncPhase::BatchWrite => ErrorKind::SyncBatchWriteFailed,
            },
            StoreError::Cancelled => ErrorKind::Cancelled,
            StoreError::BadClientConfig(_) => ErrorKind::BadClientConfig,
        }
    }

    /// Whether cancellation caused this error, at any nesting depth.
    pub fn is_cancelled(&self) -> bool {
        match self {
            StoreError::Cancelled => true,
            StoreError::Sync { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Whether the failing transaction can be run again from the start.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::InternalQueryFailure(DbError::Aborted(_)))
    }

    /// The database error underneath, if any.
    pub fn db_error(&self) -> Option<&DbError> {
        match self {
            StoreError::InternalQueryFailure(err) => Some(err),
            StoreError::Sync { source, .. } => source.db_error(),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { .. } => StoreError::QueryReturnedNoResults,
            DbError::Engine(inner) => StoreError::from(inner),
            other => StoreError::InternalQueryFailure(other),
        }
    }
}

impl From<featuredb_engine::Error> for StoreError {
    fn from(err: featuredb_engine::Error) -> Self {
        use featuredb_engine::Error;
        match err {
            Error::InvalidCursorFormat(_) => StoreError::InvalidCursorFormat(err),
            Error::InvalidInput(msg) => StoreError::InvalidInput(msg),
            Error::DuplicateKey(_) => StoreError::InvalidInput(err.to_string()),
            other => StoreError::InternalQueryFailure(DbError::Engine(other)),
        }
    }
}

/// Result type alias for data-access operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_no_results() {
        let err = StoreError::from(DbError::NotFound {
            table: "WebFeatures".into(),
        });
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_engine_errors_classified() {
        let err = StoreError::from(featuredb_engine::Error::InvalidCursorFormat("bad".into()));
        assert_eq!(err.kind(), ErrorKind::InvalidCursorFormat);

        let err = StoreError::from(featuredb_engine::Error::MissingColumn("ID".into()));
        assert_eq!(err.kind(), ErrorKind::InternalQueryFailure);

        let err = StoreError::from(DbError::Engine(featuredb_engine::Error::InvalidInput(
            "page size".into(),
        )));
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_sync_wrapping_keeps_cause() {
        let err = StoreError::sync(SyncPhase::BatchWrite, StoreError::Cancelled);
        assert_eq!(err.kind(), ErrorKind::SyncBatchWriteFailed);
        assert!(err.is_cancelled());

        let err = StoreError::sync(
            SyncPhase::AtomicWrite,
            StoreError::from(DbError::MutationLimitExceeded {
                count: 90_000,
                limit: 80_000,
            }),
        );
        assert!(!err.is_cancelled());
        assert!(matches!(
            err.db_error(),
            Some(DbError::MutationLimitExceeded { .. })
        ));
    }

    #[test]
    fn test_aborted_is_retryable() {
        let err = StoreError::from(DbError::Aborted("serialization failure".into()));
        assert!(err.is_retryable());
        assert!(!StoreError::QueryReturnedNoResults.is_retryable());
    }
}
