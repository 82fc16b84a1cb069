//! Correction instances and the JSON-lines dataset that carries them
//!
//! Each line of a dataset file is one [`Instance`]. Statement lists
//! (`preprocess_sql`, `clean_up_sql`, `sol_sql`, `error_sql`) may be missing
//! from a record; a missing list means "skip that phase", never an error.

use crate::error::{CoreError, CoreResult};
use crate::serde_helpers::string_or_seq;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

/// Stable identifier of one correction task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(u64);

impl InstanceId {
    /// Wrap a raw id
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Return the raw id
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for InstanceId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// One SQL-correction task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    /// Unique id within a dataset
    pub instance_id: InstanceId,

    /// Name of the target schema/catalog, used for prompt context
    #[serde(default)]
    pub selected_database: String,

    /// The intended query in natural language, used for prompt context
    #[serde(default)]
    pub query: String,

    /// Erroneous query text and/or the engine's error message
    #[serde(default, deserialize_with = "string_or_seq")]
    pub error_sql: Vec<String>,

    /// Fixture statements run before measurement
    #[serde(default, deserialize_with = "string_or_seq")]
    pub preprocess_sql: Vec<String>,

    /// Fixture statements run after measurement, whatever the outcome
    #[serde(default, deserialize_with = "string_or_seq")]
    pub clean_up_sql: Vec<String>,

    /// Statements whose final result set is the reference output
    #[serde(default, deserialize_with = "string_or_seq")]
    pub sol_sql: Vec<String>,
}

impl Instance {
    /// Create an instance with only an id; every statement list is empty.
    pub fn new(instance_id: impl Into<InstanceId>) -> Self {
        Self {
            instance_id: instance_id.into(),
            selected_database: String::new(),
            query: String::new(),
            error_sql: Vec::new(),
            preprocess_sql: Vec::new(),
            clean_up_sql: Vec::new(),
            sol_sql: Vec::new(),
        }
    }
}

/// Solution-only record, for datasets that ship `sol_sql` in a separate file
#[derive(Debug, Clone, Deserialize)]
struct SolutionRecord {
    instance_id: InstanceId,
    #[serde(default, deserialize_with = "string_or_seq")]
    sol_sql: Vec<String>,
}

/// An ordered collection of instances with unique ids
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    instances: Vec<Instance>,
}

impl Dataset {
    /// Build a dataset from instances, rejecting duplicate ids
    pub fn new(instances: Vec<Instance>) -> CoreResult<Self> {
        check_unique(&instances, "<memory>")?;
        Ok(Self { instances })
    }

    /// Load a newline-delimited JSON dataset
    ///
    /// Blank lines are ignored. Parse failures report the 1-based line number.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let instances = parse_lines::<Instance>(&content, path)?;
        check_unique(&instances, &path.display().to_string())?;
        log::debug!("Loaded {} instances from {}", instances.len(), path.display());
        Ok(Self { instances })
    }

    /// Replace `sol_sql` from a separate JSON-lines solutions file
    ///
    /// Records are matched by `instance_id`. Instances without a matching
    /// solution keep whatever `sol_sql` they already carried.
    pub fn merge_solutions(&mut self, path: &Path) -> CoreResult<usize> {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let records = parse_lines::<SolutionRecord>(&content, path)?;
        let mut by_id: HashMap<InstanceId, Vec<String>> = HashMap::with_capacity(records.len());
        for record in records {
            if by_id.insert(record.instance_id, record.sol_sql).is_some() {
                return Err(CoreError::DuplicateInstance {
                    id: record.instance_id.get(),
                    path: path.display().to_string(),
                });
            }
        }

        let mut merged = 0;
        for instance in &mut self.instances {
            if let Some(sol_sql) = by_id.remove(&instance.instance_id) {
                instance.sol_sql = sol_sql;
                merged += 1;
            }
        }
        if !by_id.is_empty() {
            log::warn!(
                "{} solution record(s) in {} have no matching instance",
                by_id.len(),
                path.display()
            );
        }
        Ok(merged)
    }

    /// All instances, in file order
    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    /// Look up one instance by id
    pub fn get(&self, id: InstanceId) -> Option<&Instance> {
        self.instances.iter().find(|i| i.instance_id == id)
    }

    /// Keep only the instances whose id is in `ids`, preserving file order
    pub fn retain_ids(&mut self, ids: &HashSet<InstanceId>) {
        self.instances.retain(|i| ids.contains(&i.instance_id));
    }

    /// Number of instances
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Whether the dataset holds no instances
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Consume the dataset and return its instances
    pub fn into_instances(self) -> Vec<Instance> {
        self.instances
    }
}

fn parse_lines<T: serde::de::DeserializeOwned>(content: &str, path: &Path) -> CoreResult<Vec<T>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|e| CoreError::DatasetParse {
                path: path.display().to_string(),
                line: idx + 1,
                message: e.to_string(),
            })
        })
        .collect()
}

fn check_unique(instances: &[Instance], origin: &str) -> CoreResult<()> {
    let mut seen = HashSet::with_capacity(instances.len());
    for instance in instances {
        if !seen.insert(instance.instance_id) {
            return Err(CoreError::DuplicateInstance {
                id: instance.instance_id.get(),
                path: origin.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "instance_test.rs"]
mod tests;
