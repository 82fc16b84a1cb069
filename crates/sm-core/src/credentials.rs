//! Database credentials file
//!
//! The credentials file is a small JSON object:
//!
//! ```json
//! { "db_name": "bird.duckdb", "super_user": "root", "password": "secret" }
//! ```
//!
//! `user` is accepted as an alias of `super_user`.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Connection credentials for the database collaborator
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Database name (for DuckDB, the database file path)
    pub db_name: String,

    /// User to connect as
    #[serde(rename = "super_user", alias = "user", default)]
    pub user: String,

    /// Password for `user`
    #[serde(default)]
    pub password: String,
}

impl Credentials {
    /// Load credentials from a JSON file
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::CredentialsNotFound {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let creds: Credentials = serde_json::from_str(&content)?;
        if creds.db_name.is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: format!("'db_name' is empty in {}", path.display()),
            });
        }
        Ok(creds)
    }
}

// Never print the password.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("db_name", &self.db_name)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}
