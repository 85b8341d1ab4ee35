use std::path::Path;

use anyhow::{Result, bail};
use tracing::warn;

use super::list_experiment_dirs;
use super::rules::rule_means_header;
use crate::util::{CsvTable, read_csv};

/// Stacks every experiment's `mean_metrics.csv`, tagging rows with the experiment.
pub(super) fn collect_model_means(results_root: &Path) -> Result<CsvTable> {
    let mut header = rule_means_header();
    header.push("model".to_string());

    let mut rows = Vec::new();
    for (model, model_dir) in list_experiment_dirs(results_root)? {
        let means_path = model_dir.join("mean_metrics.csv");
        if !means_path.is_file() {
            warn!(path = %means_path.display(), "experiment has no collected mean metrics");
            continue;
        }

        let table = read_csv(&means_path)?;
        let columns = header[..header.len() - 1]
            .iter()
            .map(|column| table.column_index(column))
            .collect::<Vec<Option<usize>>>();

        for source in &table.rows {
            let mut row = columns
                .iter()
                .map(|index| {
                    index
                        .and_then(|index| source.get(index))
                        .cloned()
                        .unwrap_or_default()
                })
                .collect::<Vec<String>>();
            row.push(model.clone());
            rows.push(row);
        }
    }

    if rows.is_empty() {
        bail!("no mean_metrics.csv files found under {}", results_root.display());
    }

    Ok(CsvTable { header, rows })
}
