//! Result recorder
//!
//! Writes each instance's [`RepairResult`] to its own
//! `response_{id}.csv` file. The file is written even when the repair did
//! not succeed, so a failed instance is distinguishable from one that never
//! ran.

use crate::artifact::{remove_stale_temp_files, write_atomic};
use crate::error::{EvalError, EvalResult};
use serde::{Deserialize, Serialize};
use sm_core::{InstanceId, RepairResult};
use std::path::{Path, PathBuf};

/// One CSV row of a response artifact
#[derive(Debug, Serialize, Deserialize)]
struct ResponseRecord {
    instance_id: InstanceId,
    response: String,
    success: bool,
    steps: usize,
}

/// Per-instance response artifact writer
#[derive(Debug, Clone)]
pub struct ResultRecorder {
    dir: PathBuf,
}

impl ResultRecorder {
    /// Create a recorder writing into `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Output directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the artifact for `id`
    pub fn path_for(&self, id: InstanceId) -> PathBuf {
        self.dir.join(format!("response_{id}.csv"))
    }

    /// Whether a finished artifact exists for `id`
    pub fn exists(&self, id: InstanceId) -> bool {
        self.path_for(id).is_file()
    }

    /// Write the artifact for one result
    ///
    /// Any failure is an [`EvalError::ArtifactWrite`].
    pub fn record(&self, result: &RepairResult) -> EvalResult<PathBuf> {
        let path = self.path_for(result.instance_id);
        let fail = |message: String| EvalError::ArtifactWrite {
            path: path.display().to_string(),
            message,
        };

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .serialize(ResponseRecord {
                instance_id: result.instance_id,
                response: result.final_response.clone(),
                success: result.success,
                steps: result.steps,
            })
            .map_err(|e| fail(e.to_string()))?;
        let bytes = writer.into_inner().map_err(|e| fail(e.to_string()))?;

        write_atomic(&path, &bytes)?;
        log::info!(
            "Instance {}: Wrote {} (success = {})",
            result.instance_id,
            path.display(),
            result.success
        );
        Ok(path)
    }

    /// Read the artifact for `id`
    pub fn read(&self, id: InstanceId) -> EvalResult<RepairResult> {
        let path = self.path_for(id);
        let fail = |message: String| EvalError::ArtifactRead {
            path: path.display().to_string(),
            message,
        };

        let mut reader = csv::Reader::from_path(&path).map_err(|e| fail(e.to_string()))?;
        let record: ResponseRecord = reader
            .deserialize()
            .next()
            .ok_or_else(|| fail("no record".to_string()))?
            .map_err(|e| fail(e.to_string()))?;

        Ok(RepairResult {
            instance_id: record.instance_id,
            success: record.success,
            final_response: record.response,
            steps: record.steps,
        })
    }

    /// Remove partial artifacts left behind by a cancelled run
    pub fn clean_partial(&self) -> EvalResult<usize> {
        remove_stale_temp_files(&self.dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn result(id: u64, success: bool, response: &str) -> RepairResult {
        RepairResult {
            instance_id: InstanceId::new(id),
            success,
            final_response: response.to_string(),
            steps: 2,
        }
    }

    #[test]
    fn test_record_writes_header_and_row() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = ResultRecorder::new(dir.path().join("responses"));
        let path = recorder.record(&result(7, true, "SELECT 1")).unwrap();

        assert!(path.ends_with("response_7.csv"));
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "instance_id,response,success,steps\n7,SELECT 1,true,2\n"
        );
    }

    #[test]
    fn test_multiline_response_is_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = ResultRecorder::new(dir.path());
        let original = result(3, false, "SELECT a,\n  b\nFROM \"t\"");
        recorder.record(&original).unwrap();

        assert!(recorder.exists(InstanceId::new(3)));
        assert_eq!(recorder.read(InstanceId::new(3)).unwrap(), original);
    }

    #[test]
    fn test_failed_result_still_written() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = ResultRecorder::new(dir.path());
        recorder.record(&result(4, false, "")).unwrap();
        let back = recorder.read(InstanceId::new(4)).unwrap();
        assert!(!back.success);
        assert_eq!(back.final_response, "");
    }

    #[test]
    fn test_unwritable_dir_is_artifact_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let recorder = ResultRecorder::new(blocker.join("responses"));

        let err = recorder.record(&result(1, true, "SELECT 1")).unwrap_err();
        assert!(matches!(err, EvalError::ArtifactWrite { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_clean_partial() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = ResultRecorder::new(dir.path());
        fs::write(dir.path().join("response_9.csv.tmp"), "half").unwrap();
        assert_eq!(recorder.clean_partial().unwrap(), 1);
        assert!(!recorder.exists(InstanceId::new(9)));
    }
}
