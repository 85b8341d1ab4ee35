use std::path::Path;

use anyhow::{Context, Result, bail};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use tracing::{info, warn};

use crate::cli::SimulateBaselineArgs;
use crate::model::{AllMetrics, MeanMetrics, Metric, MetricsFile};
use crate::util::{CsvTable, read_csv, write_json_pretty};

pub const BASELINE_MODEL_NAME: &str = "baseline";

pub fn run(args: SimulateBaselineArgs) -> Result<()> {
    if args.num_runs == 0 {
        bail!("--num-runs must be at least 1");
    }

    let table = read_csv(&args.baseline)?;
    let simulated = simulate_baseline(&table, args.num_runs, args.seed, &args.dataset_ver)?;

    for metrics in &simulated {
        write_baseline(&args.output_dir, metrics)?;
    }

    info!(
        rules = simulated.len(),
        runs = args.num_runs,
        seed = args.seed,
        output_dir = %args.output_dir.display(),
        "simulated baseline metrics"
    );

    Ok(())
}

/// Draws `num_runs` samples per metric from Normal(mean, 2std / 2) for each rule row.
pub fn simulate_baseline(
    table: &CsvTable,
    num_runs: usize,
    seed: u64,
    dataset_ver: &str,
) -> Result<Vec<MetricsFile>> {
    let rule_column = table
        .column_index("rule")
        .context("baseline csv is missing the `rule` column")?;

    let mut rng = StdRng::seed_from_u64(seed);
    let mut simulated = Vec::with_capacity(table.rows.len());

    for row in &table.rows {
        let rule = row
            .get(rule_column)
            .map(|cell| cell.trim())
            .filter(|cell| !cell.is_empty())
            .context("baseline row has an empty rule id")?;

        let mut samples = Vec::with_capacity(Metric::ALL.len());
        for metric in Metric::ALL {
            let Some(center) = cell_value(table, row, metric.as_str())? else {
                bail!("baseline for rule `{rule}` has no `{metric}` value");
            };
            let std_dev = match cell_value(table, row, &format!("{}_2std", metric.as_str()))? {
                Some(two_std) => two_std / 2.0,
                None => {
                    warn!(rule, metric = %metric, "baseline has no spread; samples equal the mean");
                    0.0
                }
            };

            let normal = Normal::new(center, std_dev).with_context(|| {
                format!("baseline for rule `{rule}` has an invalid `{metric}` spread")
            })?;

            let values = (0..num_runs)
                .map(|_| normal.sample(&mut rng))
                .collect::<Vec<f64>>();
            samples.push((metric, values));
        }

        let all_metrics = AllMetrics::from_samples(samples);
        simulated.push(MetricsFile {
            model_name: BASELINE_MODEL_NAME.to_string(),
            rule_name: rule.to_string(),
            dataset_ver: dataset_ver.to_string(),
            mean_metrics: Some(MeanMetrics::from_all(&all_metrics)),
            all_metrics,
            run_time: 0.0,
            num_runs,
            predictions_dir: None,
        });
    }

    Ok(simulated)
}

fn write_baseline(output_dir: &Path, metrics: &MetricsFile) -> Result<()> {
    let path = output_dir.join(&metrics.rule_name).join("metrics.json");
    write_json_pretty(&path, metrics)
}

fn cell_value(table: &CsvTable, row: &[String], column: &str) -> Result<Option<f64>> {
    let Some(index) = table.column_index(column) else {
        return Ok(None);
    };
    let cell = row.get(index).map(|cell| cell.trim()).unwrap_or_default();
    if cell.is_empty() {
        return Ok(None);
    }
    cell.parse::<f64>()
        .map(Some)
        .with_context(|| format!("invalid baseline value `{cell}` in column `{column}`"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::{parse_csv, read_json};

    const BASELINE: &str = "rule,recall,recall_2std,precision,precision_2std,f1,f1_2std,\
                            accuracy_score,accuracy_score_2std,\
                            balanced_accuracy_score,balanced_accuracy_score_2std\n\
                            r3,0.6,0.1,0.8,,0.7,0.2,0.9,0.05,0.75,0.1\n\
                            r7,0.4,0.0,0.5,0.0,0.45,0.0,0.6,0.0,0.55,0.0\n";

    #[test]
    fn same_seed_reproduces_samples() {
        let table = parse_csv(BASELINE).expect("csv");
        let first = simulate_baseline(&table, 7, 42, "reqs.json").expect("simulate");
        let second = simulate_baseline(&table, 7, 42, "reqs.json").expect("simulate");
        let other = simulate_baseline(&table, 7, 43, "reqs.json").expect("simulate");

        assert_eq!(first, second);
        assert_eq!(first[1].all_metrics.f1, vec![0.45; 7]);
        assert_ne!(first[0].all_metrics.recall, other[0].all_metrics.recall);
    }

    #[test]
    fn samples_follow_baseline_columns() {
        let table = parse_csv(BASELINE).expect("csv");
        let simulated = simulate_baseline(&table, 5, 7, "reqs.json").expect("simulate");

        assert_eq!(simulated.len(), 2);
        let r3 = &simulated[0];
        assert_eq!(r3.model_name, "baseline");
        assert_eq!(r3.rule_name, "r3");
        assert_eq!(r3.num_runs, 5);
        assert_eq!(r3.all_metrics.recall.len(), 5);
        assert!(r3.all_metrics.confusion_matrix.is_empty());
        assert!(r3.predictions_dir.is_none());
        // missing std collapses to the mean
        assert!(r3.all_metrics.precision.iter().all(|value| *value == 0.8));

        let means = r3.mean_metrics.as_ref().expect("means");
        assert!((means.recall - crate::model::mean(&r3.all_metrics.recall)).abs() < 1e-12);

        let r7 = &simulated[1];
        assert!(r7.all_metrics.recall.iter().all(|value| *value == 0.4));
        assert_eq!(r7.mean_metrics.as_ref().map(|means| means.precision), Some(0.5));
    }

    #[test]
    fn writes_one_metrics_file_per_rule() {
        let dir = tempfile::tempdir().expect("tempdir");
        let table = parse_csv(BASELINE).expect("csv");
        let simulated = simulate_baseline(&table, 3, 0, "reqs.json").expect("simulate");
        for metrics in &simulated {
            write_baseline(dir.path(), metrics).expect("write");
        }

        let stored: MetricsFile =
            read_json(&dir.path().join("r7").join("metrics.json")).expect("read back");
        assert_eq!(stored.rule_name, "r7");
        assert_eq!(stored.dataset_ver, "reqs.json");
        assert_eq!(stored.all_metrics.recall, vec![0.4; 3]);
    }

    #[test]
    fn rejects_rows_without_rule_id_or_mean() {
        let table = parse_csv("rule,recall\n,0.5\n").expect("csv");
        assert!(simulate_baseline(&table, 3, 0, "reqs.json").is_err());

        let table = parse_csv("rule,recall,recall_2std\nr3,0.5,0.1\n").expect("csv");
        let err = simulate_baseline(&table, 3, 0, "reqs.json").expect_err("precision is missing");
        assert!(err.to_string().contains("precision"));
    }

    #[test]
    fn negative_spread_is_rejected() {
        let table = parse_csv(
            "rule,recall,recall_2std,precision,f1,accuracy_score,balanced_accuracy_score\n\
             r3,0.5,-0.1,0.5,0.5,0.5,0.5\n",
        )
        .expect("csv");
        let err = simulate_baseline(&table, 3, 0, "reqs.json").expect_err("negative spread");
        assert!(err.to_string().contains("recall"));
    }

    #[test]
    fn sample_spread_tracks_half_of_two_std() {
        let table = parse_csv(
            "rule,recall,recall_2std,precision,f1,accuracy_score,balanced_accuracy_score\n\
             r3,0.5,0.2,0.5,0.5,0.5,0.5\n",
        )
        .expect("csv");
        let simulated = simulate_baseline(&table, 4_000, 11, "reqs.json").expect("simulate");
        let recall = &simulated[0].all_metrics.recall;

        let center = crate::model::mean(recall);
        let spread = crate::model::population_std(recall);
        assert!((center - 0.5).abs() < 0.01, "mean = {center}");
        assert!((spread - 0.1).abs() < 0.01, "std = {spread}");
    }
}
