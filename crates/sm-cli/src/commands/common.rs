//! Shared utilities for CLI commands

use anyhow::{Context, Result};
use sm_core::{Config, Credentials, Dataset};
use sm_db::DuckDbBackend;
use sm_eval::CancelFlag;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::cli::GlobalArgs;

/// Error type representing a non-zero process exit code.
///
/// Use `return Err(ExitCode(N).into())` instead of `std::process::exit(N)`
/// so that RAII destructors run and open sessions roll back.
#[derive(Debug)]
pub(crate) struct ExitCode(pub(crate) i32);

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Control flow only; the command already reported the failure.
        write!(f, "")
    }
}

impl std::error::Error for ExitCode {}

/// Configuration plus the directory its relative paths resolve against
pub(crate) struct Project {
    pub(crate) root: PathBuf,
    pub(crate) config: Config,
}

impl Project {
    /// Absolute path for a CLI override or a configured default
    pub(crate) fn resolve(&self, override_path: Option<&Path>, default: PathBuf) -> PathBuf {
        match override_path {
            Some(p) => self.root.join(p),
            None => default,
        }
    }
}

/// Load the configuration named by the global arguments.
pub(crate) fn load_project(global: &GlobalArgs) -> Result<Project> {
    let config = match &global.config {
        Some(path) => Config::load(path),
        None => Config::load_from_dir(&global.project_dir),
    }
    .context("Failed to load configuration")?;

    Ok(Project {
        root: global.project_dir.clone(),
        config,
    })
}

/// Database location: `--target`, then `database.path`, then `db_name`
/// from the credentials file.
pub(crate) fn resolve_db_path(project: &Project, global: &GlobalArgs) -> Result<String> {
    let raw = if let Some(target) = &global.target {
        target.clone()
    } else if let Some(path) = &project.config.database.path {
        path.clone()
    } else if let Some(creds_path) = project.config.credentials_absolute(&project.root) {
        let creds = Credentials::load(&creds_path).context("Failed to load credentials")?;
        creds.db_name
    } else {
        anyhow::bail!("No database configured: set database.path, database.credentials or --target");
    };

    if raw == ":memory:" || Path::new(&raw).is_absolute() {
        Ok(raw)
    } else {
        Ok(project.root.join(raw).display().to_string())
    }
}

/// Open the configured database.
pub(crate) fn open_database(project: &Project, global: &GlobalArgs) -> Result<DuckDbBackend> {
    let path = resolve_db_path(project, global)?;
    log::info!("Using {} database at {}", project.config.database.db_type, path);
    DuckDbBackend::new(&path).with_context(|| format!("Failed to open database '{path}'"))
}

/// Load the dataset, optionally merging a separate solutions file.
pub(crate) fn load_dataset(
    project: &Project,
    dataset_override: Option<&Path>,
    solutions_override: Option<&Path>,
) -> Result<Dataset> {
    let path = project.resolve(
        dataset_override,
        project.config.dataset_absolute(&project.root),
    );
    let mut dataset = Dataset::load(&path)
        .with_context(|| format!("Failed to load dataset {}", path.display()))?;

    let solutions = match solutions_override {
        Some(p) => Some(project.root.join(p)),
        None => project.config.solutions_absolute(&project.root),
    };
    if let Some(solutions) = solutions {
        let merged = dataset
            .merge_solutions(&solutions)
            .with_context(|| format!("Failed to merge solutions {}", solutions.display()))?;
        log::info!("Merged sol_sql for {merged} instances from {}", solutions.display());
    }
    Ok(dataset)
}

/// Response to the n-th Ctrl-C of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    /// Stop at the next step boundary
    Cancel,
    /// Stop now, without waiting for in-flight generator calls
    Exit,
}

fn interrupt_action(count: usize) -> Interrupt {
    if count <= 1 {
        Interrupt::Cancel
    } else {
        Interrupt::Exit
    }
}

/// Set `cancel` when the process receives Ctrl-C; a second Ctrl-C exits
/// immediately with status 130.
pub(crate) fn cancel_on_ctrl_c(cancel: CancelFlag) {
    tokio::spawn(async move {
        let mut count = 0;
        while tokio::signal::ctrl_c().await.is_ok() {
            count += 1;
            match interrupt_action(count) {
                Interrupt::Cancel => {
                    eprintln!(
                        "\nInterrupted: finishing in-flight steps and rolling back (Ctrl-C again to exit now)..."
                    );
                    cancel.cancel();
                }
                Interrupt::Exit => {
                    eprintln!("\nInterrupted again: exiting");
                    std::process::exit(130);
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_interrupt_exits() {
        assert_eq!(interrupt_action(1), Interrupt::Cancel);
        assert_eq!(interrupt_action(2), Interrupt::Exit);
        assert_eq!(interrupt_action(3), Interrupt::Exit);
    }

    fn global(dir: &Path) -> GlobalArgs {
        GlobalArgs {
            verbose: false,
            project_dir: dir.to_path_buf(),
            config: None,
            target: None,
            log_file: None,
            quiet: true,
        }
    }

    #[test]
    fn test_db_path_from_credentials() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("sqlmend.yml"),
            "database:\n  credentials: creds.json\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("creds.json"),
            r#"{"db_name": "bench.duckdb", "super_user": "root", "password": "x"}"#,
        )
        .unwrap();

        let g = global(dir.path());
        let project = load_project(&g).unwrap();
        assert_eq!(
            resolve_db_path(&project, &g).unwrap(),
            dir.path().join("bench.duckdb").display().to_string()
        );
    }

    #[test]
    fn test_target_overrides_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sqlmend.yml"), "database:\n  path: a.duckdb\n").unwrap();
        let mut g = global(dir.path());
        g.target = Some(":memory:".to_string());

        let project = load_project(&g).unwrap();
        assert_eq!(resolve_db_path(&project, &g).unwrap(), ":memory:");
    }

    #[test]
    fn test_no_database_configured() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sqlmend.yml"), "").unwrap();
        let g = global(dir.path());
        let project = load_project(&g).unwrap();
        assert!(resolve_db_path(&project, &g).is_err());
    }
}
