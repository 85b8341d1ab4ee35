use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::{CollectArgs, CollectMode};
use crate::util::write_csv;

mod models;
mod rules;
mod runs;
#[cfg(test)]
mod tests;

use models::collect_model_means;
use rules::collect_rule_means;
use runs::collect_rule_runs;

/// Result folders that hold aggregates rather than experiments.
const RESERVED_DIRS: [&str; 2] = ["all", "statistical_tests"];

pub fn run(args: CollectArgs) -> Result<()> {
    let results_root = args.output_root.join("results");

    let (table, output_path) = match args.mode {
        CollectMode::Rules => {
            let experiment_dir = args
                .results_dir
                .as_deref()
                .context("--results-dir is required for --mode rules")?;
            let table = collect_rule_means(experiment_dir)?;
            (table, experiment_dir.join("mean_metrics.csv"))
        }
        CollectMode::Models => {
            let table = collect_model_means(&results_root)?;
            (table, results_root.join("all").join("mean_metrics.csv"))
        }
        CollectMode::Runs => {
            let rule_id = args
                .rule
                .as_deref()
                .context("--rule is required for --mode runs")?;
            let table = collect_rule_runs(&results_root, rule_id)?;
            (
                table,
                results_root.join("all").join(format!("{rule_id}_runs.csv")),
            )
        }
    };

    let output_path = args.output.unwrap_or(output_path);
    write_csv(&output_path, &table)?;
    info!(
        mode = ?args.mode,
        rows = table.rows.len(),
        path = %output_path.display(),
        "wrote collected metrics"
    );

    Ok(())
}

/// Experiment folders directly under `results_root`, sorted by name.
fn list_experiment_dirs(results_root: &Path) -> Result<Vec<(String, PathBuf)>> {
    let entries = fs::read_dir(results_root)
        .with_context(|| format!("failed to read {}", results_root.display()))?;

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry
            .with_context(|| format!("failed to read entry in {}", results_root.display()))?;
        let path = entry.path();
        if !entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_dir()
        {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        if RESERVED_DIRS.contains(&name.as_str()) {
            continue;
        }
        dirs.push((name, path));
    }

    dirs.sort();
    Ok(dirs)
}

fn format_cell(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
