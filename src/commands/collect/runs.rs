use std::path::Path;

use anyhow::Result;
use tracing::error;

use super::{format_cell, list_experiment_dirs};
use crate::model::{Metric, MetricsFile};
use crate::util::{CsvTable, read_json};

/// Long-format table of every replicate's metrics for one rule across experiments.
pub(super) fn collect_rule_runs(results_root: &Path, rule_id: &str) -> Result<CsvTable> {
    let mut header = Metric::ALL
        .iter()
        .map(|metric| metric.as_str().to_string())
        .collect::<Vec<String>>();
    header.extend(["run_idx", "rule_id", "model"].map(String::from));

    let mut rows = Vec::new();
    for (model, model_dir) in list_experiment_dirs(results_root)? {
        let metrics_path = model_dir.join(rule_id).join("metrics.json");
        if !metrics_path.is_file() {
            error!(path = %metrics_path.display(), "experiment results not found");
            continue;
        }

        let stored: MetricsFile = read_json(&metrics_path)?;
        for run_idx in 0..stored.num_runs {
            let mut row = Metric::ALL
                .iter()
                .map(|metric| {
                    stored
                        .all_metrics
                        .values(*metric)
                        .get(run_idx)
                        .copied()
                        .map(format_cell)
                        .unwrap_or_default()
                })
                .collect::<Vec<String>>();
            row.push(run_idx.to_string());
            row.push(rule_id.to_string());
            row.push(model.clone());
            rows.push(row);
        }
    }

    Ok(CsvTable { header, rows })
}
