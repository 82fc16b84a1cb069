//! collect-gt command implementation
//!
//! Runs every instance's reference solution once and stores the non-empty
//! outputs plus the qualifying-id list.

use anyhow::{Context, Result};
use sm_eval::{CancelFlag, EvalError, GroundTruthCollector, LogSink, ReferenceStore};

use crate::cli::{CollectArgs, GlobalArgs};
use crate::commands::common::{self, ExitCode};

/// Execute the collect-gt command
pub async fn execute(args: &CollectArgs, global: &GlobalArgs) -> Result<()> {
    let project = common::load_project(global)?;
    let dataset = common::load_dataset(
        &project,
        args.dataset.as_deref(),
        args.solutions.as_deref(),
    )?;
    let db = common::open_database(&project, global)?;

    let store = ReferenceStore::new(
        project.config.reference_dir_absolute(&project.root),
        project.config.qualifying_ids_absolute(&project.root),
    );
    let cancel = CancelFlag::new();
    common::cancel_on_ctrl_c(cancel.clone());

    if !global.quiet {
        println!(
            "Collecting reference outputs for {} instances...\n",
            dataset.len()
        );
    }

    let sink = LogSink;
    let collector = GroundTruthCollector::new(&store, &sink).with_cancel(cancel);
    let summary = match collector.collect(&db, dataset.instances()).await {
        Ok(summary) => summary,
        Err(EvalError::Cancelled) => {
            eprintln!("Collection cancelled; qualifying ids were not written");
            return Err(ExitCode(130).into());
        }
        Err(e) => return Err(e).context("Ground-truth collection failed"),
    };

    if !global.quiet {
        println!(
            "Collected {} references ({} empty, {} failed) out of {} instances in {:.1}s",
            summary.captured,
            summary.empty,
            summary.failed,
            summary.total,
            summary.duration.as_secs_f64()
        );
        println!("  references:    {}", store.dir().display());
        println!(
            "  qualifying ids: {}",
            project.config.qualifying_ids_absolute(&project.root).display()
        );
    }
    Ok(())
}
