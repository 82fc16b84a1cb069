//! Error types for sm-core

use thiserror::Error;

/// Core error type for sqlmend
#[derive(Error, Debug)]
pub enum CoreError {
    /// C001: Configuration file not found
    #[error("[C001] Config file not found: {path}")]
    ConfigNotFound { path: String },

    /// C002: Invalid configuration value
    #[error("[C002] Invalid config: {message}")]
    ConfigInvalid { message: String },

    /// C003: Credentials file not found
    #[error("[C003] Credentials file not found: {path}")]
    CredentialsNotFound { path: String },

    /// C004: A dataset line could not be parsed as an instance
    #[error("[C004] Invalid instance record at {path}:{line}: {message}")]
    DatasetParse {
        path: String,
        line: usize,
        message: String,
    },

    /// C005: Two records in one dataset share an instance id
    #[error("[C005] Duplicate instance_id {id} in {path}")]
    DuplicateInstance { id: u64, path: String },

    /// C006: IO error
    #[error("[C006] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// C007: IO error with file path context
    #[error("[C007] Failed to read '{path}': {source}")]
    IoWithPath {
        path: String,
        source: std::io::Error,
    },

    /// C008: YAML parse error
    #[error("[C008] Config parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;
