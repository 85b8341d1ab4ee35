use std::path::Path;

use anyhow::{Context, Result, bail, ensure};
use rayon::prelude::*;
use serde_json::Value;
use tracing::{Span, info};

use super::executor::{FlowTarget, RetryPolicy, process_flow};
use crate::evaluation::{MetricSink, calculate_metrics};
use crate::flow::FlowClient;
use crate::model::{ClassificationMetrics, DatasetRow, Prediction, load_dataset};

#[derive(Debug, Clone)]
pub struct BatchSettings<'a> {
    pub dataset_path: &'a Path,
    pub flow_path: &'a Path,
    pub input_data_path: &'a str,
    pub query_id: &'a str,
    pub rule_id: &'a str,
    pub result_key: &'a str,
    pub variant: &'a str,
    pub runs: usize,
    pub workers: usize,
    pub retry: RetryPolicy,
}

/// Everything a batch produced, aligned to dataset order.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub metrics: Vec<ClassificationMetrics>,
    /// One entry per dataset row, each holding `runs` predictions.
    pub predictions: Vec<Vec<Prediction>>,
    pub truth: Vec<Value>,
    pub lines: Vec<String>,
}

impl BatchOutcome {
    pub fn replicate_predictions(&self, replicate_index: usize) -> Vec<Prediction> {
        self.predictions
            .iter()
            .map(|row| row[replicate_index])
            .collect()
    }
}

struct RowOutcome {
    row_index: usize,
    predictions: Vec<Prediction>,
}

pub fn run_flow(
    client: &dyn FlowClient,
    sink: &dyn MetricSink,
    settings: &BatchSettings<'_>,
) -> Result<BatchOutcome> {
    let rows = load_dataset(settings.dataset_path, settings.query_id, settings.rule_id)?;
    run_rows(client, sink, settings, &rows)
}

/// Fans rows out to a fixed-size pool and waits for every row to finish.
pub fn run_rows(
    client: &dyn FlowClient,
    sink: &dyn MetricSink,
    settings: &BatchSettings<'_>,
    rows: &[DatasetRow],
) -> Result<BatchOutcome> {
    if settings.workers == 0 {
        bail!("worker count must be at least 1");
    }
    if settings.runs == 0 {
        bail!("replicate count must be at least 1");
    }

    info!(
        rows = rows.len(),
        runs = settings.runs,
        rule = settings.rule_id,
        workers = settings.workers,
        "starting runs"
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(settings.workers)
        .thread_name(|index| format!("flow-worker-{index}"))
        .build()
        .context("failed to build flow worker pool")?;

    let target = FlowTarget {
        flow_path: settings.flow_path,
        variant: settings.variant,
        result_key: settings.result_key,
        rule_id: settings.rule_id,
        data_file: settings.input_data_path,
    };
    let span = Span::current();

    // Indexed collect keeps submission order; the first error aborts the batch.
    let outcomes = pool.install(|| {
        rows.par_iter()
            .enumerate()
            .map(|(row_index, row)| {
                let _entered = span.enter();
                let predictions =
                    process_flow(client, row, &target, settings.runs, &settings.retry)
                        .with_context(|| format!("flow failed for dataset row {row_index}"))?;
                Ok(RowOutcome {
                    row_index,
                    predictions,
                })
            })
            .collect::<Result<Vec<RowOutcome>>>()
    })?;

    let mut predictions = Vec::with_capacity(outcomes.len());
    for (expected_index, outcome) in outcomes.into_iter().enumerate() {
        ensure!(
            outcome.row_index == expected_index,
            "row {} reassembled at position {expected_index}",
            outcome.row_index
        );
        ensure!(
            outcome.predictions.len() == settings.runs,
            "row {expected_index} produced {} predictions, expected {}",
            outcome.predictions.len(),
            settings.runs
        );
        predictions.push(outcome.predictions);
    }

    let truth = rows.iter().map(|row| row.truth.clone()).collect::<Vec<Value>>();
    let lines = rows.iter().map(|row| row.text.clone()).collect::<Vec<String>>();

    let mut outcome = BatchOutcome {
        metrics: Vec::with_capacity(settings.runs),
        predictions,
        truth,
        lines,
    };

    for replicate_index in 0..settings.runs {
        let column = outcome.replicate_predictions(replicate_index);
        let metrics = calculate_metrics(&column, &outcome.truth, sink)?;
        outcome.metrics.push(metrics);
    }

    Ok(outcome)
}
