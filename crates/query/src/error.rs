//! Query execution error types.

use thiserror::Error;

/// Query execution errors.
///
/// Messages of database-originated variants are the database's own text so
/// they can be shown to clients unchanged.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A statement tried to write through the read-only executor.
    #[error("{0}")]
    ReadOnlyViolation(String),

    /// A referenced column or relation does not exist.
    #[error("{0}")]
    UndefinedObject(String),

    /// A layer query continued past its first statement.
    #[error("layer sql must be a single statement")]
    MultipleStatements,

    /// Any other error raised while executing a statement.
    #[error("{0}")]
    Execution(String),

    #[error("query timed out after {0}ms")]
    Timeout(u64),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for query operations.
pub type QueryResult<T> = std::result::Result<T, QueryError>;

/// PostgreSQL SQLSTATE for writes inside a read-only transaction.
const PG_READ_ONLY_SQL_TRANSACTION: &str = "25006";
/// PostgreSQL SQLSTATE for undefined column.
const PG_UNDEFINED_COLUMN: &str = "42703";
/// PostgreSQL SQLSTATE for undefined table.
const PG_UNDEFINED_TABLE: &str = "42P01";

impl QueryError {
    /// Classify a database error from its code and message.
    pub fn classify(code: Option<&str>, message: &str) -> Self {
        let message = message.to_string();
        match code {
            Some(PG_READ_ONLY_SQL_TRANSACTION) => return Self::ReadOnlyViolation(message),
            Some(PG_UNDEFINED_COLUMN | PG_UNDEFINED_TABLE) => {
                return Self::UndefinedObject(message);
            }
            _ => {}
        }

        // SQLite reports through extended result codes and fixed messages.
        if message.contains("readonly database") || message.contains("query_only") {
            Self::ReadOnlyViolation(message)
        } else if message.starts_with("no such column") || message.starts_with("no such table") {
            Self::UndefinedObject(message)
        } else {
            Self::Execution(message)
        }
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Database(db) => Self::classify(db.code().as_deref(), db.message()),
            sqlx::Error::Configuration(e) => Self::Config(e.to_string()),
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Self::Connection(e.to_string()),
            other => Self::Execution(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_postgres_codes() {
        let err = QueryError::classify(
            Some("25006"),
            "cannot execute INSERT in a read-only transaction",
        );
        assert!(matches!(err, QueryError::ReadOnlyViolation(_)));
        assert_eq!(
            err.to_string(),
            "cannot execute INSERT in a read-only transaction"
        );

        let err = QueryError::classify(Some("42703"), "column \"unexistant\" does not exist");
        assert!(matches!(err, QueryError::UndefinedObject(_)));
        assert_eq!(err.to_string(), "column \"unexistant\" does not exist");

        assert!(matches!(
            QueryError::classify(Some("42P01"), "relation \"t\" does not exist"),
            QueryError::UndefinedObject(_)
        ));
        assert!(matches!(
            QueryError::classify(Some("22P02"), "invalid input syntax"),
            QueryError::Execution(_)
        ));
    }

    #[test]
    fn test_classify_sqlite_messages() {
        assert!(matches!(
            QueryError::classify(Some("8"), "attempt to write a readonly database"),
            QueryError::ReadOnlyViolation(_)
        ));
        assert!(matches!(
            QueryError::classify(Some("1"), "no such column: unexistant"),
            QueryError::UndefinedObject(_)
        ));
        assert!(matches!(
            QueryError::classify(Some("1"), "near \"selec\": syntax error"),
            QueryError::Execution(_)
        ));
    }

    #[test]
    fn test_multiple_statements_message() {
        assert_eq!(
            QueryError::MultipleStatements.to_string(),
            "layer sql must be a single statement"
        );
    }

    #[test]
    fn test_timeout_message() {
        assert_eq!(
            QueryError::Timeout(250).to_string(),
            "query timed out after 250ms"
        );
    }
}
