//! CLI argument definitions using clap derive API

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// sqlmend - evaluate iterative SQL repair against ground-truth outputs
#[derive(Parser, Debug)]
#[command(name = "sm")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to project directory
    #[arg(short = 'p', long, global = true, default_value = ".")]
    pub project_dir: PathBuf,

    /// Override config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override target database path
    #[arg(short, long, global = true, env = "SQLMEND_TARGET")]
    pub target: Option<String>,

    /// Also append log output to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Suppress progress output
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run reference solutions and store their outputs
    CollectGt(CollectArgs),

    /// Run the iterative repair loop over qualifying instances
    Eval(EvalArgs),

    /// Check config, credentials, dataset and reference artifacts
    Validate(ValidateArgs),
}

/// Arguments for the collect-gt command
#[derive(Args, Debug, Clone, Default)]
pub struct CollectArgs {
    /// Override the dataset path
    #[arg(long)]
    pub dataset: Option<PathBuf>,

    /// Override the solutions file path
    #[arg(long)]
    pub solutions: Option<PathBuf>,
}

/// Arguments for the eval command
#[derive(Args, Debug, Clone, Default)]
pub struct EvalArgs {
    /// Override the dataset path
    #[arg(long)]
    pub dataset: Option<PathBuf>,

    /// Generator model identity
    #[arg(short, long)]
    pub model: Option<String>,

    /// Tokenizer identity
    #[arg(long)]
    pub tokenizer: Option<String>,

    /// Sampling temperature
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Nucleus sampling cutoff
    #[arg(long)]
    pub top_p: Option<f64>,

    /// Maximum tokens per generator response
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Maximum repair steps per instance
    #[arg(short = 'n', long)]
    pub max_steps: Option<usize>,

    /// Instances repaired in parallel
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Only evaluate these instance ids (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub ids: Vec<u64>,

    /// Re-run instances that already have a response artifact
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the validate command
#[derive(Args, Debug, Clone, Default)]
pub struct ValidateArgs {
    /// Treat warnings as errors
    #[arg(long)]
    pub strict: bool,
}

#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;
