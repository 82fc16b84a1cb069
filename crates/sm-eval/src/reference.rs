//! Reference artifact store
//!
//! One `query_{id}_output.json` file per instance holding the typed rows of
//! the reference solution, plus a JSON list of the instance ids that
//! produced a non-empty reference. Written by the ground-truth collector,
//! read-only afterwards.

use crate::artifact::write_atomic;
use crate::error::{EvalError, EvalResult};
use sm_core::{InstanceId, ResultSet};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Filesystem-backed reference artifacts
#[derive(Debug, Clone)]
pub struct ReferenceStore {
    dir: PathBuf,
    ids_path: PathBuf,
}

impl ReferenceStore {
    /// Create a store rooted at `dir`, with the qualifying ids at `ids_path`
    pub fn new(dir: impl Into<PathBuf>, ids_path: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ids_path: ids_path.into(),
        }
    }

    /// Directory holding the per-instance artifacts
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the artifact for `id`
    pub fn path_for(&self, id: InstanceId) -> PathBuf {
        self.dir.join(format!("query_{id}_output.json"))
    }

    /// Whether an artifact exists for `id`
    pub fn contains(&self, id: InstanceId) -> bool {
        self.path_for(id).is_file()
    }

    /// Persist the reference rows for `id`
    pub fn write(&self, id: InstanceId, rows: &ResultSet) -> EvalResult<()> {
        let path = self.path_for(id);
        let json = serde_json::to_vec(rows).map_err(|e| EvalError::ArtifactWrite {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        write_atomic(&path, &json)
    }

    /// Load the reference rows for `id`
    pub fn read(&self, id: InstanceId) -> EvalResult<ResultSet> {
        let path = self.path_for(id);
        if !path.is_file() {
            return Err(EvalError::MissingReference(id));
        }
        read_json(&path)
    }

    /// Persist the qualifying-id set (sorted ascending)
    pub fn write_ids(&self, ids: &BTreeSet<InstanceId>) -> EvalResult<()> {
        let ids: Vec<InstanceId> = ids.iter().copied().collect();
        let json = serde_json::to_vec_pretty(&ids).map_err(|e| EvalError::ArtifactWrite {
            path: self.ids_path.display().to_string(),
            message: e.to_string(),
        })?;
        write_atomic(&self.ids_path, &json)
    }

    /// Load the qualifying-id set
    pub fn read_ids(&self) -> EvalResult<BTreeSet<InstanceId>> {
        let ids: Vec<InstanceId> = read_json(&self.ids_path)?;
        Ok(ids.into_iter().collect())
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> EvalResult<T> {
    let fail = |message: String| EvalError::ArtifactRead {
        path: path.display().to_string(),
        message,
    };
    let content = fs::read_to_string(path).map_err(|e| fail(e.to_string()))?;
    serde_json::from_str(&content).map_err(|e| fail(e.to_string()))
}
