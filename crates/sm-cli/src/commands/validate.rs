//! Validate command implementation

use anyhow::Result;
use sm_core::{Credentials, Dataset, InstanceId};
use sm_eval::{MarkerExtractor, PromptBuilder, ReferenceStore};
use std::collections::BTreeSet;

use crate::cli::{GlobalArgs, ValidateArgs};
use crate::commands::common::{self, ExitCode, Project};

/// Validation result severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Severity {
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => write!(f, "WARNING"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// A single validation issue
struct ValidationIssue {
    severity: Severity,
    code: &'static str,
    message: String,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.code, self.message)
    }
}

/// Collect validation issues
struct ValidationContext {
    issues: Vec<ValidationIssue>,
}

impl ValidationContext {
    fn new() -> Self {
        Self { issues: Vec::new() }
    }

    fn error(&mut self, code: &'static str, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity: Severity::Error,
            code,
            message: message.into(),
        });
    }

    fn warning(&mut self, code: &'static str, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity: Severity::Warning,
            code,
            message: message.into(),
        });
    }

    fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }

    fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }

    fn has_code(&self, code: &str) -> bool {
        self.issues.iter().any(|i| i.code == code)
    }
}

/// Execute the validate command
pub async fn execute(args: &ValidateArgs, global: &GlobalArgs) -> Result<()> {
    let project = common::load_project(global)?;
    println!("Validating project: {}\n", project.root.display());

    let mut ctx = ValidationContext::new();
    validate_database(&project, global, &mut ctx);
    validate_repair_settings(&project, &mut ctx);
    if let Some(dataset) = validate_dataset(&project, &mut ctx) {
        println!("  instances: {}", dataset.len());
        validate_references(&project, &dataset, &mut ctx);
    }

    print_issues_and_summary(&ctx, args.strict)
}

fn validate_database(project: &Project, global: &GlobalArgs, ctx: &mut ValidationContext) {
    if let Some(path) = project.config.credentials_absolute(&project.root) {
        if let Err(e) = Credentials::load(&path) {
            ctx.error("E002", e.to_string());
            return;
        }
    }
    match common::resolve_db_path(project, global) {
        Ok(path) => println!("  database:  {path}"),
        Err(e) => ctx.error("E003", e.to_string()),
    }
}

fn validate_repair_settings(project: &Project, ctx: &mut ValidationContext) {
    let config = &project.config;
    if let Err(e) = MarkerExtractor::new(&config.repair.marker) {
        ctx.error("E005", e.to_string());
    }
    if let Some(template) = &config.repair.prompt_template {
        let path = project.root.join(template);
        match std::fs::read_to_string(&path) {
            Ok(source) => {
                if let Err(e) = PromptBuilder::with_template(source) {
                    ctx.error("E004", format!("{e} ({})", path.display()));
                }
            }
            Err(e) => ctx.error("E004", format!("{}: {e}", path.display())),
        }
    }
    if config.generator.model.is_empty() {
        ctx.warning(
            "W005",
            "generator.model is not set; `sm eval` will need --model",
        );
    }
}

fn validate_dataset(project: &Project, ctx: &mut ValidationContext) -> Option<Dataset> {
    let dataset = match common::load_dataset(project, None, None) {
        Ok(dataset) => dataset,
        Err(e) => {
            ctx.error("E001", format!("{e:#}"));
            return None;
        }
    };

    let without_solution: Vec<String> = dataset
        .instances()
        .iter()
        .filter(|i| i.sol_sql.is_empty())
        .map(|i| i.instance_id.to_string())
        .collect();
    if !without_solution.is_empty() {
        ctx.warning(
            "W001",
            format!(
                "{} instances have no sol_sql and will never qualify: {}",
                without_solution.len(),
                summarize_ids(&without_solution)
            ),
        );
    }
    Some(dataset)
}

fn validate_references(project: &Project, dataset: &Dataset, ctx: &mut ValidationContext) {
    let store = ReferenceStore::new(
        project.config.reference_dir_absolute(&project.root),
        project.config.qualifying_ids_absolute(&project.root),
    );
    let qualifying: BTreeSet<InstanceId> = match store.read_ids() {
        Ok(ids) => ids,
        Err(_) => {
            ctx.warning(
                "W002",
                "no qualifying-id file yet; run `sm collect-gt` before `sm eval`",
            );
            return;
        }
    };
    println!("  qualifying: {}", qualifying.len());

    let missing_artifact: Vec<String> = qualifying
        .iter()
        .filter(|id| !store.contains(**id))
        .map(ToString::to_string)
        .collect();
    if !missing_artifact.is_empty() {
        ctx.warning(
            "W003",
            format!(
                "{} qualifying instances lack a reference artifact: {}",
                missing_artifact.len(),
                summarize_ids(&missing_artifact)
            ),
        );
    }

    let unknown: Vec<String> = qualifying
        .iter()
        .filter(|id| dataset.get(**id).is_none())
        .map(ToString::to_string)
        .collect();
    if !unknown.is_empty() {
        ctx.warning(
            "W004",
            format!(
                "{} qualifying ids are not in the dataset: {}",
                unknown.len(),
                summarize_ids(&unknown)
            ),
        );
    }
}

/// First few ids, then a count of the rest
fn summarize_ids(ids: &[String]) -> String {
    const SHOWN: usize = 10;
    if ids.len() <= SHOWN {
        ids.join(", ")
    } else {
        format!("{}, ... ({} more)", ids[..SHOWN].join(", "), ids.len() - SHOWN)
    }
}

fn print_issues_and_summary(ctx: &ValidationContext, strict: bool) -> Result<()> {
    println!();
    for issue in &ctx.issues {
        println!("{}", issue);
    }

    let error_count = ctx.error_count();
    let warning_count = ctx.warning_count();

    println!();
    if error_count == 0 && (warning_count == 0 || !strict) {
        println!(
            "Validation passed: {} errors, {} warnings",
            error_count, warning_count
        );
        Ok(())
    } else if strict && error_count == 0 {
        println!(
            "Validation failed (strict mode): {} errors, {} warnings",
            error_count, warning_count
        );
        Err(ExitCode(1).into())
    } else {
        println!(
            "Validation failed: {} errors, {} warnings",
            error_count, warning_count
        );
        // A broken dataset is reported with its own exit code
        if ctx.has_code("E001") {
            Err(ExitCode(3).into())
        } else {
            Err(ExitCode(1).into())
        }
    }
}

#[cfg(test)]
#[path = "validate_test.rs"]
mod tests;
