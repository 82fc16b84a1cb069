//! Error types for sm-db

use thiserror::Error;

/// Database operation errors
#[derive(Error, Debug)]
pub enum DbError {
    /// Connection error (D001)
    #[error("[D001] Database connection failed: {0}")]
    ConnectionError(String),

    /// Statement execution error (D002)
    #[error("[D002] SQL execution failed: {0}")]
    ExecutionError(String),

    /// BEGIN/COMMIT/ROLLBACK failed (D003)
    #[error("[D003] Transaction control failed: {0}")]
    TransactionError(String),

    /// Mutex poisoned (D004)
    #[error("[D004] Database mutex poisoned: {0}")]
    MutexPoisoned(String),
}

impl DbError {
    /// Whether the error means the connection itself is unusable
    pub fn is_connection(&self) -> bool {
        matches!(self, DbError::ConnectionError(_) | DbError::MutexPoisoned(_))
    }

    /// Whether a concurrent transaction touched the same object
    ///
    /// DuckDB resolves concurrency optimistically: a write-write conflict
    /// aborts the statement (or the commit) instead of blocking.
    pub fn is_conflict(&self) -> bool {
        match self {
            DbError::ExecutionError(m) | DbError::TransactionError(m) => {
                m.to_ascii_lowercase().contains("conflict")
            }
            _ => false,
        }
    }

    /// Raw engine message without the error code prefix
    pub fn message(&self) -> &str {
        match self {
            DbError::ConnectionError(m)
            | DbError::ExecutionError(m)
            | DbError::TransactionError(m)
            | DbError::MutexPoisoned(m) => m,
        }
    }
}

/// Result type alias for DbError
pub type DbResult<T> = Result<T, DbError>;

impl From<duckdb::Error> for DbError {
    fn from(err: duckdb::Error) -> Self {
        DbError::ExecutionError(err.to_string())
    }
}
