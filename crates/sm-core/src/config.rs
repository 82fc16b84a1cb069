//! Configuration types and parsing for sqlmend.yml

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration from sqlmend.yml
///
/// Every field has a default, so an empty file is a valid configuration.
/// Relative paths are resolved against the directory holding the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// JSON-lines dataset of correction instances
    #[serde(default = "default_dataset")]
    pub dataset: String,

    /// Optional JSON-lines file carrying `sol_sql`, joined by `instance_id`
    #[serde(default)]
    pub solutions: Option<String>,

    /// Directory for reference artifacts (one file per instance)
    #[serde(default = "default_reference_dir")]
    pub reference_dir: String,

    /// JSON file listing the instance ids that produced a reference
    #[serde(default = "default_qualifying_ids")]
    pub qualifying_ids: String,

    /// Directory for per-instance response artifacts
    #[serde(default = "default_response_dir")]
    pub response_dir: String,

    /// Database connection configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Candidate-query generator configuration
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// Sampling parameters sent with every generator call
    #[serde(default)]
    pub sampling: SamplingParams,

    /// Repair loop configuration
    #[serde(default)]
    pub repair: RepairConfig,
}

/// Database type selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    /// DuckDB (default)
    #[default]
    DuckDb,
}

impl std::fmt::Display for DbType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbType::DuckDb => write!(f, "duckdb"),
        }
    }
}

/// Database connection configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Database type
    #[serde(rename = "type", default)]
    pub db_type: DbType,

    /// Database path; when unset, `db_name` from the credentials file is used
    #[serde(default)]
    pub path: Option<String>,

    /// Path to a JSON credentials file (`db_name`, `super_user`, `password`)
    #[serde(default)]
    pub credentials: Option<String>,
}

/// Generator collaborator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneratorConfig {
    /// Base URL of an OpenAI-compatible completions server
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Model identity passed to the server
    #[serde(default)]
    pub model: String,

    /// Tokenizer identity; recorded for reproducibility
    #[serde(default)]
    pub tokenizer: Option<String>,

    /// Environment variable holding the API key, if the server needs one
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Hard timeout for one generator call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: String::new(),
            tokenizer: None,
            api_key_env: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Sampling options understood by the generator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SamplingParams {
    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Nucleus sampling cutoff
    #[serde(default = "default_top_p")]
    pub top_p: f64,

    /// Maximum tokens per response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Iterative repair configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepairConfig {
    /// Maximum repair steps per instance
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// End-of-reasoning marker after which the candidate query starts
    #[serde(default = "default_marker")]
    pub marker: String,

    /// Instances repaired in parallel
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Optional path to a minijinja template file replacing the built-in prompt
    #[serde(default)]
    pub prompt_template: Option<String>,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            marker: default_marker(),
            concurrency: default_concurrency(),
            prompt_template: None,
        }
    }
}

fn default_dataset() -> String {
    "data/input.jsonl".to_string()
}

fn default_reference_dir() -> String {
    "data/gtout".to_string()
}

fn default_qualifying_ids() -> String {
    "data/query_ids.json".to_string()
}

fn default_response_dir() -> String {
    "data/responses".to_string()
}

fn default_endpoint() -> String {
    "http://localhost:8000/v1".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_temperature() -> f64 {
    0.7
}

fn default_top_p() -> f64 {
    0.9
}

fn default_max_tokens() -> u32 {
    10_000
}

fn default_max_steps() -> usize {
    15
}

fn default_marker() -> String {
    "</think>".to_string()
}

fn default_concurrency() -> usize {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dataset: default_dataset(),
            solutions: None,
            reference_dir: default_reference_dir(),
            qualifying_ids: default_qualifying_ids(),
            response_dir: default_response_dir(),
            database: DatabaseConfig::default(),
            generator: GeneratorConfig::default(),
            sampling: SamplingParams::default(),
            repair: RepairConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a file path
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        // An empty file deserializes to `null`, not an empty mapping.
        let config: Config = if content.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(&content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a directory
    /// Looks for sqlmend.yml or sqlmend.yaml
    pub fn load_from_dir(dir: &Path) -> CoreResult<Self> {
        let yml_path = dir.join("sqlmend.yml");
        let yaml_path = dir.join("sqlmend.yaml");

        if yml_path.exists() {
            Self::load(&yml_path)
        } else if yaml_path.exists() {
            Self::load(&yaml_path)
        } else {
            Err(CoreError::ConfigNotFound {
                path: yml_path.display().to_string(),
            })
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> CoreResult<()> {
        if self.repair.max_steps == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "repair.max_steps must be at least 1".to_string(),
            });
        }
        if self.repair.concurrency == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "repair.concurrency must be at least 1".to_string(),
            });
        }
        if self.repair.marker.is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "repair.marker cannot be empty".to_string(),
            });
        }
        if !(self.sampling.temperature >= 0.0) {
            return Err(CoreError::ConfigInvalid {
                message: format!(
                    "sampling.temperature must be >= 0, got {}",
                    self.sampling.temperature
                ),
            });
        }
        if !(self.sampling.top_p > 0.0 && self.sampling.top_p <= 1.0) {
            return Err(CoreError::ConfigInvalid {
                message: format!("sampling.top_p must be in (0, 1], got {}", self.sampling.top_p),
            });
        }
        if self.sampling.max_tokens == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "sampling.max_tokens must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Absolute path of the dataset file
    pub fn dataset_absolute(&self, root: &Path) -> PathBuf {
        root.join(&self.dataset)
    }

    /// Absolute path of the solutions file, if configured
    pub fn solutions_absolute(&self, root: &Path) -> Option<PathBuf> {
        self.solutions.as_ref().map(|s| root.join(s))
    }

    /// Absolute path of the reference artifact directory
    pub fn reference_dir_absolute(&self, root: &Path) -> PathBuf {
        root.join(&self.reference_dir)
    }

    /// Absolute path of the qualifying-id file
    pub fn qualifying_ids_absolute(&self, root: &Path) -> PathBuf {
        root.join(&self.qualifying_ids)
    }

    /// Absolute path of the response artifact directory
    pub fn response_dir_absolute(&self, root: &Path) -> PathBuf {
        root.join(&self.response_dir)
    }

    /// Absolute path of the credentials file, if configured
    pub fn credentials_absolute(&self, root: &Path) -> Option<PathBuf> {
        self.database.credentials.as_ref().map(|c| root.join(c))
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
