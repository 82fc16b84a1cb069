//! eval command implementation
//!
//! Repairs every qualifying instance with the configured generator and
//! writes one response artifact per instance plus a run summary.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use sm_core::{Config, InstanceId, SamplingParams};
use sm_db::Database;
use sm_eval::{
    BatchOptions, BatchSummary, CancelFlag, HttpGenerator, InstanceReport, InstanceStatus,
    LogSink, MarkerExtractor, PromptBuilder, ReferenceStore, RepairBatch, RepairController,
    ResultRecorder,
};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::cli::{EvalArgs, GlobalArgs};
use crate::commands::common::{self, ExitCode};

/// Overall outcome of an eval run
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
enum RunStatus {
    Completed,
    Failed,
    Cancelled,
}

/// Per-instance line of summary.json
#[derive(Debug, Serialize)]
struct InstanceLine {
    instance_id: InstanceId,
    status: String,
    steps: usize,
    duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// summary.json written beside the response artifacts
#[derive(Debug, Serialize)]
struct RunSummary {
    run_id: String,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    status: RunStatus,
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tokenizer: Option<String>,
    max_steps: usize,
    sampling: SamplingParams,
    total: usize,
    matched: usize,
    exhausted: usize,
    skipped: usize,
    no_reference: usize,
    errored: usize,
    cancelled: usize,
    duration_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    fatal_error: Option<String>,
    instances: Vec<InstanceLine>,
}

/// Apply CLI overrides on top of the loaded configuration
fn apply_overrides(config: &mut Config, args: &EvalArgs) -> Result<()> {
    if let Some(model) = &args.model {
        config.generator.model = model.clone();
    }
    if let Some(tokenizer) = &args.tokenizer {
        config.generator.tokenizer = Some(tokenizer.clone());
    }
    if let Some(t) = args.temperature {
        config.sampling.temperature = t;
    }
    if let Some(p) = args.top_p {
        config.sampling.top_p = p;
    }
    if let Some(m) = args.max_tokens {
        config.sampling.max_tokens = m;
    }
    if let Some(n) = args.max_steps {
        config.repair.max_steps = n;
    }
    if let Some(j) = args.concurrency {
        config.repair.concurrency = j;
    }
    config.validate().context("Invalid option")?;
    if config.generator.model.is_empty() {
        anyhow::bail!("No generator model configured: set generator.model or pass --model");
    }
    Ok(())
}

fn load_prompt_builder(config: &Config, root: &Path) -> Result<PromptBuilder> {
    let Some(template) = &config.repair.prompt_template else {
        return Ok(PromptBuilder::new());
    };
    let path = root.join(template);
    let source = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read prompt template {}", path.display()))?;
    PromptBuilder::with_template(source)
        .with_context(|| format!("Invalid prompt template {}", path.display()))
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({msg})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Execute the eval command
pub async fn execute(args: &EvalArgs, global: &GlobalArgs) -> Result<()> {
    let started_at = Utc::now();
    let run_id = Uuid::new_v4().to_string()[..8].to_string();

    let mut project = common::load_project(global)?;
    apply_overrides(&mut project.config, args)?;
    let config = &project.config;

    let mut dataset = common::load_dataset(&project, args.dataset.as_deref(), None)?;
    let references = ReferenceStore::new(
        config.reference_dir_absolute(&project.root),
        config.qualifying_ids_absolute(&project.root),
    );
    let mut qualifying: HashSet<InstanceId> = references
        .read_ids()
        .context("Failed to read qualifying ids (run `sm collect-gt` first)")?
        .into_iter()
        .collect();
    if !args.ids.is_empty() {
        let wanted: HashSet<InstanceId> = args.ids.iter().copied().map(InstanceId::new).collect();
        qualifying.retain(|id| wanted.contains(id));
    }
    dataset.retain_ids(&qualifying);

    let db: Arc<dyn Database> = Arc::new(common::open_database(&project, global)?);
    let generator = HttpGenerator::from_config(&config.generator)
        .context("Failed to set up generator client")?;
    let extractor =
        MarkerExtractor::new(&config.repair.marker).context("Invalid end-of-reasoning marker")?;
    let prompts = load_prompt_builder(config, &project.root)?;

    log::info!(
        "Run {run_id}: model {} at {}, {} instances, {} steps, concurrency {}",
        config.generator.model,
        generator.url(),
        dataset.len(),
        config.repair.max_steps,
        config.repair.concurrency
    );

    let controller = RepairController::new(
        Arc::new(generator),
        Arc::new(extractor),
        Arc::new(prompts),
        Arc::new(LogSink),
        config.sampling,
        config.repair.max_steps,
    );
    let response_dir = config.response_dir_absolute(&project.root);
    let cancel = CancelFlag::new();
    common::cancel_on_ctrl_c(cancel.clone());

    let mut batch = RepairBatch::new(
        db,
        controller,
        references,
        ResultRecorder::new(&response_dir),
        BatchOptions {
            concurrency: config.repair.concurrency,
            force: args.force,
        },
    )
    .with_cancel(cancel);

    let progress = (!global.quiet).then(|| Arc::new(progress_bar(dataset.len())));
    if let Some(pb) = &progress {
        let pb = Arc::clone(pb);
        batch = batch.with_observer(Arc::new(move |report: &InstanceReport| {
            pb.set_message(format!("{} {}", report.instance_id, report.status));
            pb.inc(1);
        }));
    }

    let summary = batch.run(dataset.into_instances()).await;

    if let Some(pb) = progress {
        pb.finish_with_message("done");
    }

    let run_summary = build_run_summary(run_id, started_at, config, &summary);
    let summary_path = response_dir.join("summary.json");
    let json = serde_json::to_vec_pretty(&run_summary)?;
    sm_eval::artifact::write_atomic(&summary_path, &json)
        .context("Failed to write run summary")?;

    if !global.quiet {
        print_summary(&run_summary);
        println!("  summary: {}", summary_path.display());
    }

    if let Some(fatal) = summary.fatal {
        return Err(fatal).context("Evaluation halted");
    }
    if run_summary.cancelled > 0 {
        eprintln!("Run cancelled; rerun to finish the remaining instances");
        return Err(ExitCode(130).into());
    }
    if run_summary.errored > 0 {
        return Err(ExitCode(1).into());
    }
    Ok(())
}

fn build_run_summary(
    run_id: String,
    started_at: DateTime<Utc>,
    config: &Config,
    summary: &BatchSummary,
) -> RunSummary {
    let cancelled = summary.count(InstanceStatus::Cancelled);
    let status = if summary.fatal.is_some() {
        RunStatus::Failed
    } else if cancelled > 0 {
        RunStatus::Cancelled
    } else {
        RunStatus::Completed
    };

    RunSummary {
        run_id,
        started_at,
        finished_at: Utc::now(),
        status,
        model: config.generator.model.clone(),
        tokenizer: config.generator.tokenizer.clone(),
        max_steps: config.repair.max_steps,
        sampling: config.sampling,
        total: summary.total(),
        matched: summary.count(InstanceStatus::Matched),
        exhausted: summary.count(InstanceStatus::Exhausted),
        skipped: summary.count(InstanceStatus::Skipped),
        no_reference: summary.count(InstanceStatus::NoReference),
        errored: summary.count(InstanceStatus::Errored),
        cancelled,
        duration_secs: summary.duration.as_secs_f64(),
        fatal_error: summary.fatal.as_ref().map(ToString::to_string),
        instances: summary
            .reports
            .iter()
            .map(|r| InstanceLine {
                instance_id: r.instance_id,
                status: r.status.to_string(),
                steps: r.steps,
                duration_ms: r.duration.as_millis() as u64,
                error: r.error.clone(),
            })
            .collect(),
    }
}

fn print_summary(s: &RunSummary) {
    let attempted = s.matched + s.exhausted;
    let rate = if attempted > 0 {
        100.0 * s.matched as f64 / attempted as f64
    } else {
        0.0
    };
    println!();
    println!(
        "Matched {}/{} ({:.1}%) in {:.1}s",
        s.matched, attempted, rate, s.duration_secs
    );
    if s.skipped > 0 {
        println!("  skipped (already done): {}", s.skipped);
    }
    if s.no_reference > 0 {
        println!("  no reference:           {}", s.no_reference);
    }
    if s.errored > 0 {
        println!("  errors:                 {}", s.errored);
    }
    if s.cancelled > 0 {
        println!("  cancelled:              {}", s.cancelled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_applied_and_validated() {
        let mut config = Config::default();
        let args = EvalArgs {
            model: Some("qwen".to_string()),
            top_p: Some(0.5),
            max_steps: Some(3),
            ..EvalArgs::default()
        };
        apply_overrides(&mut config, &args).unwrap();
        assert_eq!(config.generator.model, "qwen");
        assert_eq!(config.sampling.top_p, 0.5);
        assert_eq!(config.repair.max_steps, 3);
        assert_eq!(config.sampling.temperature, 0.7);

        let bad = EvalArgs {
            max_steps: Some(0),
            ..args
        };
        assert!(apply_overrides(&mut config, &bad).is_err());
    }

    #[test]
    fn test_model_required() {
        let mut config = Config::default();
        assert!(apply_overrides(&mut config, &EvalArgs::default()).is_err());
    }
}
