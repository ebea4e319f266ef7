//! Error types for the featuredb engine.

use thiserror::Error;

/// All possible errors from the featuredb engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Row decoding errors
    #[error("missing column: {0}")]
    MissingColumn(String),

    #[error("type mismatch for column '{column}': expected {expected}, got {got}")]
    TypeMismatch {
        column: String,
        expected: String,
        got: String,
    },

    #[error("invalid value for column '{column}': {reason}")]
    InvalidValue { column: String, reason: String },

    // Input errors
    #[error("invalid cursor format: {0}")]
    InvalidCursorFormat(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("duplicate key in desired state: {0}")]
    DuplicateKey(String),

    // Statement errors
    #[error("unbound statement parameter: @{0}")]
    UnboundParameter(String),

    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl Error {
    /// Attach a column name to a conversion error produced without one.
    pub(crate) fn for_column(self, column: &str) -> Self {
        match self {
            Error::TypeMismatch { expected, got, .. } => Error::TypeMismatch {
                column: column.to_string(),
                expected,
                got,
            },
            Error::InvalidValue { reason, .. } => Error::InvalidValue {
                column: column.to_string(),
                reason,
            },
            other => other,
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::MissingColumn("FeatureKey".into());
        assert_eq!(err.to_string(), "missing column: FeatureKey");

        let err = Error::TypeMismatch {
            column: "ReleaseDate".into(),
            expected: "Timestamp".into(),
            got: "String".into(),
        };
        assert_eq!(
            err.to_string(),
            "type mismatch for column 'ReleaseDate': expected Timestamp, got String"
        );

        let err = Error::UnboundParameter("browser".into());
        assert_eq!(err.to_string(), "unbound statement parameter: @browser");
    }

    #[test]
    fn for_column_fills_in_name() {
        let err = Error::TypeMismatch {
            column: String::new(),
            expected: "Int64".into(),
            got: "Bool".into(),
        }
        .for_column("Rate");

        assert_eq!(
            err,
            Error::TypeMismatch {
                column: "Rate".into(),
                expected: "Int64".into(),
                got: "Bool".into(),
            }
        );
    }
}
