//! Error types for the schema diff engine.

use crate::schema::Dialect;

/// Failure reported by a [`LiveQuery`](crate::classifier::LiveQuery)
/// implementation.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct QueryError {
    /// Driver-level error message.
    pub message: String,
}

impl QueryError {
    /// Creates a query error from any displayable message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(err: sqlx::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Errors that can occur while diffing, rendering, classifying or
/// applying schema changes.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    /// A snapshot failed structural validation before diffing began.
    #[error("Invalid {snapshot} snapshot: {message}")]
    Validation {
        /// Which snapshot was rejected (`prev` or `cur`).
        snapshot: String,
        /// What is wrong with it.
        message: String,
    },

    /// A squashed string could not be decoded back into its entity.
    #[error("Malformed squashed {kind} '{value}': {reason}")]
    MalformedSquash {
        /// Entity kind (index, primary key, ...).
        kind: &'static str,
        /// The offending encoded value.
        value: String,
        /// What could not be decoded.
        reason: String,
    },

    /// A resolver cancelled the diff. No statements were produced.
    #[error("Diff aborted while resolving {scope}")]
    Aborted {
        /// The category being resolved when the abort happened.
        scope: String,
    },

    /// A resolver returned a result that does not account for every
    /// candidate exactly once.
    #[error("Resolver for {scope} broke its contract: {message}")]
    ResolverContract {
        /// The category being resolved.
        scope: String,
        /// Description of the violation.
        message: String,
    },

    /// A statement cannot be expressed in the target dialect.
    #[error("{operation} is not supported by the {dialect} dialect")]
    Unsupported {
        /// Target dialect.
        dialect: Dialect,
        /// Human-readable description of the statement.
        operation: String,
    },

    /// Data-loss statements were about to run without approval.
    #[error("Approval required before applying:\n{}", .warnings.iter().map(|w| format!("  - {w}")).collect::<Vec<_>>().join("\n"))]
    ApprovalRequired {
        /// The data-loss warnings that need approval.
        warnings: Vec<String>,
    },

    /// A statement failed during apply; later statements were not run.
    #[error("Statement #{index} failed: {sql}: {source}")]
    Execution {
        /// Zero-based position of the failing statement.
        index: usize,
        /// The SQL text that failed.
        sql: String,
        /// Underlying failure.
        #[source]
        source: QueryError,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DiffError {
    /// Returns true if this error is a clean, resolver-initiated cancellation.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }

    pub(crate) fn validation(snapshot: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            snapshot: snapshot.to_string(),
            message: message.into(),
        }
    }
}

/// Result type for schema diff operations.
pub type Result<T> = std::result::Result<T, DiffError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_flag() {
        let err = DiffError::Aborted {
            scope: "tables".to_string(),
        };
        assert!(err.is_cancellation());
        assert!(!DiffError::validation("prev", "bad").is_cancellation());
    }

    #[test]
    fn test_approval_message_lists_warnings() {
        let err = DiffError::ApprovalRequired {
            warnings: vec!["drop users".to_string(), "drop posts".to_string()],
        };
        let text = err.to_string();
        assert!(text.contains("  - drop users"));
        assert!(text.contains("  - drop posts"));
    }

    #[test]
    fn test_unsupported_message() {
        let err = DiffError::Unsupported {
            dialect: Dialect::Sqlite,
            operation: "Alter column 'age' in table 'users'".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Alter column 'age' in table 'users' is not supported by the sqlite dialect"
        );
    }

    #[test]
    fn test_execution_keeps_driver_error_as_source() {
        use std::error::Error as _;

        let err = DiffError::Execution {
            index: 2,
            sql: "DROP TABLE \"users\"".to_string(),
            source: QueryError::from(sqlx::Error::RowNotFound),
        };
        assert!(err.to_string().starts_with("Statement #2 failed: DROP TABLE \"users\": "));
        let source = err.source().map(ToString::to_string);
        assert_eq!(source, Some(sqlx::Error::RowNotFound.to_string()));
    }
}
