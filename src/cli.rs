use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::commands::significance::DEFAULT_ALPHA;
use crate::config::DEFAULT_OUTPUT_DIR;
use crate::flow::DEFAULT_FLOW_PROGRAM;
use crate::model::Metric;

#[derive(Parser, Debug)]
#[command(
    name = "reqeval",
    version,
    about = "Requirement-classification experiments over LLM prompt flows"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Run(RunArgs),
    Collect(CollectArgs),
    Significance(SignificanceArgs),
    SimulateBaseline(SimulateBaselineArgs),
    PrepareRule(PrepareRuleArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(long)]
    pub config: PathBuf,

    #[arg(long)]
    pub experiment_name: Option<String>,

    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    #[arg(long)]
    pub workers: Option<usize>,

    #[arg(long)]
    pub retry: Option<usize>,

    /// Only run these configured rule ids.
    #[arg(long = "rule")]
    pub rules: Vec<String>,

    #[arg(long, default_value_t = false)]
    pub no_predictions: bool,

    #[arg(long, default_value = DEFAULT_FLOW_PROGRAM)]
    pub flow_program: String,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CollectMode {
    Rules,
    Models,
    Runs,
}

#[derive(Args, Debug, Clone)]
pub struct CollectArgs {
    #[arg(long, value_enum, default_value_t = CollectMode::Rules)]
    pub mode: CollectMode,

    /// Experiment folder holding one sub-folder per rule (`--mode rules`).
    #[arg(long)]
    pub results_dir: Option<PathBuf>,

    #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output_root: PathBuf,

    /// Rule id to gather replicates for (`--mode runs`).
    #[arg(long)]
    pub rule: Option<String>,

    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct SignificanceArgs {
    #[arg(long)]
    pub baseline: PathBuf,

    #[arg(long, default_value = "experiment_outputs/results")]
    pub results_root: PathBuf,

    #[arg(long = "hypothesis")]
    pub hypotheses: Vec<String>,

    #[arg(long = "rule")]
    pub rules: Vec<String>,

    #[arg(long = "metric", value_enum)]
    pub metrics: Vec<Metric>,

    #[arg(long, default_value_t = DEFAULT_ALPHA)]
    pub alpha: f64,

    #[arg(long)]
    pub report_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct SimulateBaselineArgs {
    #[arg(long)]
    pub baseline: PathBuf,

    #[arg(long, default_value = "experiment_outputs/results/baseline")]
    pub output_dir: PathBuf,

    #[arg(long, default_value_t = 7)]
    pub num_runs: usize,

    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    #[arg(long, default_value = "baseline")]
    pub dataset_ver: String,
}

#[derive(Args, Debug, Clone)]
pub struct PrepareRuleArgs {
    #[arg(long)]
    pub data_file: PathBuf,

    #[arg(long)]
    pub rule: String,
}
