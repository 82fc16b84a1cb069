//! Error types for sm-eval

use sm_core::{CoreError, InstanceId};
use sm_db::DbError;
use thiserror::Error;

/// Evaluation errors
///
/// Statement failures inside a phase are not errors; they are reported as
/// [`ExecutionOutcome`](crate::phase::ExecutionOutcome)s. Only conditions
/// that stop an instance (or the whole run) surface here.
#[derive(Error, Debug)]
pub enum EvalError {
    /// No connection could be opened or it became unusable (V001). Halts the run.
    #[error("[V001] Database connection failed: {0}")]
    ConnectionFatal(String),

    /// BEGIN/COMMIT/ROLLBACK failed for one instance (V009)
    #[error("[V009] Transaction control failed: {0}")]
    Transaction(String),

    /// A concurrent instance wrote the same object (V010). Retrying the
    /// instance alone resolves it.
    #[error("[V010] Transaction conflict: {0}")]
    Conflict(String),

    /// A result or reference artifact could not be written (V002). Halts the run.
    #[error("[V002] Failed to write artifact '{path}': {message}")]
    ArtifactWrite { path: String, message: String },

    /// An artifact exists but could not be read (V003)
    #[error("[V003] Failed to read artifact '{path}': {message}")]
    ArtifactRead { path: String, message: String },

    /// No reference output was collected for the instance (V004)
    #[error("[V004] No reference output for instance {0}")]
    MissingReference(InstanceId),

    /// The generator collaborator failed or timed out (V005)
    #[error("[V005] Generator call failed: {0}")]
    Generator(String),

    /// The prompt template is invalid or failed to render (V006)
    #[error("[V006] Prompt template error: {0}")]
    Prompt(String),

    /// The extraction pattern could not be compiled (V007)
    #[error("[V007] Invalid extraction pattern: {0}")]
    Extractor(String),

    /// The run was cancelled before the instance finished (V008)
    #[error("[V008] Run cancelled")]
    Cancelled,

    /// Core error (config, dataset)
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl EvalError {
    /// Whether the error means the harness itself is broken and the whole
    /// batch must stop
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EvalError::ConnectionFatal(_) | EvalError::ArtifactWrite { .. }
        )
    }
}

/// Result type alias for EvalError
pub type EvalResult<T> = Result<T, EvalError>;

/// Database errors reaching this conversion come from connecting or from
/// transaction control, never from a measured statement. Only a lost
/// connection is fatal.
impl From<DbError> for EvalError {
    fn from(err: DbError) -> Self {
        if err.is_conflict() {
            EvalError::Conflict(err.message().to_string())
        } else if err.is_connection() {
            EvalError::ConnectionFatal(err.to_string())
        } else {
            EvalError::Transaction(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_connection_errors_are_fatal() {
        let lost = EvalError::from(DbError::ConnectionError("gone".into()));
        assert!(matches!(lost, EvalError::ConnectionFatal(_)));
        assert!(lost.is_fatal());

        let commit = EvalError::from(DbError::TransactionError("COMMIT failed: io".into()));
        assert!(matches!(commit, EvalError::Transaction(_)));
        assert!(!commit.is_fatal());

        let conflict = EvalError::from(DbError::TransactionError(
            "COMMIT failed: TransactionContext Error: Catalog write-write conflict on create with \"fx\"".into(),
        ));
        assert!(matches!(conflict, EvalError::Conflict(_)));
        assert!(!conflict.is_fatal());
    }
}

impl From<minijinja::Error> for EvalError {
    fn from(err: minijinja::Error) -> Self {
        EvalError::Prompt(err.to_string())
    }
}
