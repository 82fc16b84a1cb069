//! Atomic artifact writes

use crate::error::{EvalError, EvalResult};
use std::fs;
use std::path::Path;

/// Extension used for in-flight writes
pub const TEMP_EXTENSION: &str = "tmp";

/// Write `bytes` to `path` atomically
///
/// Uses write-to-temp-then-rename, so a reader (or a later run) never sees
/// a half-written artifact. Parent directories are created as needed.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> EvalResult<()> {
    let fail = |e: std::io::Error| EvalError::ArtifactWrite {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(fail)?;
    }

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".");
    temp_name.push(TEMP_EXTENSION);
    let temp_path = Path::new(&temp_name);

    fs::write(temp_path, bytes).map_err(fail)?;
    if let Err(e) = fs::rename(temp_path, path) {
        let _ = fs::remove_file(temp_path);
        return Err(fail(e));
    }
    Ok(())
}

/// Delete leftover `*.tmp` files in `dir` from an interrupted run
///
/// Returns the number of files removed. A missing directory is not an error.
pub fn remove_stale_temp_files(dir: &Path) -> EvalResult<usize> {
    if !dir.is_dir() {
        return Ok(0);
    }

    let entries = fs::read_dir(dir).map_err(|e| EvalError::ArtifactWrite {
        path: dir.display().to_string(),
        message: e.to_string(),
    })?;

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_temp = path.is_file()
            && path.extension().and_then(|e| e.to_str()) == Some(TEMP_EXTENSION);
        if !is_temp {
            continue;
        }
        fs::remove_file(&path).map_err(|e| EvalError::ArtifactWrite {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        log::debug!("Removed partial artifact {}", path.display());
        removed += 1;
    }
    Ok(removed)
}
