use std::path::Path;

use anyhow::{Result, bail};

use super::{format_cell, list_experiment_dirs, round3};
use crate::model::{MeanMetrics, Metric, MetricsFile, population_std};
use crate::util::{CsvTable, read_json};

pub(super) fn rule_means_header() -> Vec<String> {
    let mut header = vec!["rule".to_string()];
    for metric in Metric::ALL {
        header.push(metric.as_str().to_string());
        header.push(format!("{}_2std", metric.as_str()));
    }
    header
}

/// One row per rule: mean and two standard deviations of every metric.
pub(super) fn collect_rule_means(experiment_dir: &Path) -> Result<CsvTable> {
    let mut rows = Vec::new();

    for (_, rule_dir) in list_experiment_dirs(experiment_dir)? {
        let metrics_path = rule_dir.join("metrics.json");
        if !metrics_path.is_file() {
            continue;
        }

        let stored: MetricsFile = read_json(&metrics_path)?;
        let means = stored
            .mean_metrics
            .clone()
            .unwrap_or_else(|| MeanMetrics::from_all(&stored.all_metrics));

        let mut row = vec![stored.rule_name.clone()];
        for metric in Metric::ALL {
            let two_std = 2.0 * population_std(stored.all_metrics.values(metric));
            row.push(format_cell(round3(means.value(metric))));
            row.push(format_cell(round3(two_std)));
        }
        rows.push(row);
    }

    if rows.is_empty() {
        bail!("no metrics.json files found under {}", experiment_dir.display());
    }

    Ok(CsvTable {
        header: rule_means_header(),
        rows,
    })
}
