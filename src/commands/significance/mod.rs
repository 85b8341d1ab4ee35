use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::SignificanceArgs;
use crate::model::{Metric, MetricsFile, mean};
use crate::util::{CsvTable, now_utc_string, read_csv, read_json, write_json_pretty};

mod stats;
#[cfg(test)]
mod tests;

use stats::one_sample_t_test;

pub const DEFAULT_ALPHA: f64 = 0.05;
pub const DEFAULT_HYPOTHESES: [&str; 4] = [
    "hypothesis001",
    "hypothesis002",
    "hypothesis003",
    "hypothesis006",
];
pub const DEFAULT_RULES: [&str; 8] = ["r3", "r7", "r8", "r9", "r16", "r18", "r30", "r31"];

/// Baseline metric values indexed by rule id, one column per metric.
#[derive(Debug, Clone, Default)]
pub struct BaselineTable {
    values: HashMap<String, HashMap<String, f64>>,
}

impl BaselineTable {
    pub fn load(path: &Path) -> Result<Self> {
        let table = read_csv(path)?;
        Self::from_csv(&table).with_context(|| format!("invalid baseline table: {}", path.display()))
    }

    pub fn from_csv(table: &CsvTable) -> Result<Self> {
        if table.header.len() < 2 {
            bail!("baseline table needs a rule column and at least one metric column");
        }

        let mut values = HashMap::new();
        for row in &table.rows {
            let Some(rule_id) = row.first() else {
                continue;
            };
            let metrics = table
                .header
                .iter()
                .enumerate()
                .skip(1)
                .map(|(index, column)| {
                    let value = row
                        .get(index)
                        .and_then(|cell| cell.trim().parse::<f64>().ok())
                        .unwrap_or(f64::NAN);
                    (column.clone(), value)
                })
                .collect::<HashMap<String, f64>>();
            values.insert(rule_id.trim().to_string(), metrics);
        }

        Ok(Self { values })
    }

    /// Baseline for `rule_id`/`metric`, NaN when the cell is absent or blank.
    pub fn value(&self, rule_id: &str, metric: Metric) -> f64 {
        self.values
            .get(rule_id)
            .and_then(|metrics| metrics.get(metric.as_str()))
            .copied()
            .unwrap_or(f64::NAN)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TTestOutcome {
    pub t_statistic: f64,
    pub p_value: f64,
    pub baseline: f64,
    pub sample_mean: f64,
}

/// Tests one stored experiment's replicate values against a baseline scalar.
pub fn student_t_test(
    results_root: &Path,
    hypothesis: &str,
    rule_id: &str,
    metric: Metric,
    baseline: f64,
) -> Result<TTestOutcome> {
    if baseline.is_nan() {
        return Ok(TTestOutcome {
            t_statistic: f64::NAN,
            p_value: f64::NAN,
            baseline,
            sample_mean: f64::NAN,
        });
    }

    let metrics_path = results_root
        .join(hypothesis)
        .join(rule_id)
        .join("metrics.json");
    let stored: MetricsFile = read_json(&metrics_path)?;
    let samples = stored.all_metrics.values(metric);

    let (t_statistic, p_value) = one_sample_t_test(samples, baseline);
    Ok(TTestOutcome {
        t_statistic,
        p_value,
        baseline,
        sample_mean: mean(samples),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct SignificanceRecord {
    pub hypothesis: String,
    pub metric_name: String,
    pub rule_id: String,
    pub null_metric: f64,
    pub sample_metric: f64,
    pub t_student: f64,
    pub pval_student: f64,
    pub reject_h0_twotail: bool,
    pub reject_h0_onetail: bool,
}

#[derive(Debug, Serialize)]
struct SignificanceReport {
    manifest_version: u32,
    generated_at: String,
    baseline_path: String,
    results_root: String,
    alpha: f64,
    records: Vec<SignificanceRecord>,
}

pub fn loop_hypothesis_tests(
    results_root: &Path,
    baseline: &BaselineTable,
    hypotheses: &[String],
    metrics: &[Metric],
    rules: &[String],
    alpha: f64,
) -> Result<Vec<SignificanceRecord>> {
    let mut records = Vec::with_capacity(hypotheses.len() * metrics.len() * rules.len());

    for hypothesis in hypotheses {
        for metric in metrics {
            for rule_id in rules {
                let outcome = student_t_test(
                    results_root,
                    hypothesis,
                    rule_id,
                    *metric,
                    baseline.value(rule_id, *metric),
                )?;

                records.push(SignificanceRecord {
                    hypothesis: hypothesis.clone(),
                    metric_name: metric.as_str().to_string(),
                    rule_id: rule_id.clone(),
                    null_metric: outcome.baseline,
                    sample_metric: outcome.sample_mean,
                    t_student: outcome.t_statistic,
                    pval_student: outcome.p_value,
                    reject_h0_twotail: outcome.p_value < alpha,
                    reject_h0_onetail: outcome.p_value / 2.0 < alpha && outcome.t_statistic > 0.0,
                });
            }
        }
    }

    Ok(records)
}

pub fn run(args: SignificanceArgs) -> Result<()> {
    if !(args.alpha > 0.0 && args.alpha < 1.0) {
        bail!("alpha must lie in (0, 1), got {}", args.alpha);
    }

    let baseline = BaselineTable::load(&args.baseline)?;
    let hypotheses = or_defaults(&args.hypotheses, &DEFAULT_HYPOTHESES);
    let rules = or_defaults(&args.rules, &DEFAULT_RULES);
    let metrics = if args.metrics.is_empty() {
        Metric::ALL.to_vec()
    } else {
        args.metrics.clone()
    };

    let records = loop_hypothesis_tests(
        &args.results_root,
        &baseline,
        &hypotheses,
        &metrics,
        &rules,
        args.alpha,
    )?;

    let untestable = records
        .iter()
        .filter(|record| record.pval_student.is_nan())
        .count();
    if untestable > 0 {
        warn!(untestable, "some combinations produced no test statistic");
    }
    for record in records.iter().filter(|record| record.reject_h0_twotail) {
        info!(
            hypothesis = %record.hypothesis,
            rule = %record.rule_id,
            metric = %record.metric_name,
            t = record.t_student,
            p = record.pval_student,
            "significant difference from baseline"
        );
    }

    let report_path = args
        .report_path
        .clone()
        .unwrap_or_else(|| default_report_path(&args.results_root));
    let report = SignificanceReport {
        manifest_version: 1,
        generated_at: now_utc_string(),
        baseline_path: args.baseline.display().to_string(),
        results_root: args.results_root.display().to_string(),
        alpha: args.alpha,
        records,
    };
    write_json_pretty(&report_path, &report)?;
    info!(
        path = %report_path.display(),
        tests = report.records.len(),
        "wrote significance report"
    );

    Ok(())
}

fn or_defaults(values: &[String], defaults: &[&str]) -> Vec<String> {
    if values.is_empty() {
        defaults.iter().map(|value| value.to_string()).collect()
    } else {
        values.to_vec()
    }
}

fn default_report_path(results_root: &Path) -> PathBuf {
    results_root.join("statistical_tests").join("student_t_tests.json")
}
