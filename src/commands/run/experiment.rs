use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, info_span, warn};

use super::batch::{BatchSettings, run_flow};
use super::executor::RetryPolicy;
use super::output::{ExperimentOutput, Replicate};
use crate::evaluation::MetricSink;
use crate::flow::FlowClient;
use crate::model::RunManifest;
use crate::util::{now_utc_string, path_basename, sha256_file, utc_compact_string, write_json_pretty};

#[derive(Debug, Clone)]
pub struct ExperimentSpec {
    pub experiment_name: String,
    pub dataset_path: PathBuf,
    pub flow_path: PathBuf,
    /// Rule data path as the flow sees it (relative to the flow directory).
    pub input_data_path: String,
    pub query_id: String,
    pub rule_id: String,
    pub result_key: String,
    pub variant: String,
    pub num_runs: usize,
    pub num_workers: usize,
    pub retry: RetryPolicy,
    pub output_dir: PathBuf,
    pub output_predictions: bool,
}

pub fn run_experiment(
    client: &dyn FlowClient,
    sink: &dyn MetricSink,
    spec: &ExperimentSpec,
) -> Result<ExperimentOutput> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    let span = info_span!(
        "experiment",
        run_id = %run_id,
        experiment = %spec.experiment_name,
        rule = %spec.rule_id
    );
    let _entered = span.enter();

    let started = Instant::now();
    let outcome = run_flow(
        client,
        sink,
        &BatchSettings {
            dataset_path: &spec.dataset_path,
            flow_path: &spec.flow_path,
            input_data_path: &spec.input_data_path,
            query_id: &spec.query_id,
            rule_id: &spec.rule_id,
            result_key: &spec.result_key,
            variant: &spec.variant,
            runs: spec.num_runs,
            workers: spec.num_workers,
            retry: spec.retry,
        },
    )?;

    let replicates = outcome
        .metrics
        .iter()
        .enumerate()
        .map(|(replicate_index, metrics)| Replicate {
            metrics: metrics.clone(),
            predictions: outcome.replicate_predictions(replicate_index),
        })
        .collect::<Vec<Replicate>>();
    let run_time = started.elapsed().as_secs_f64();

    let mut experiment = ExperimentOutput::new(
        spec.experiment_name.clone(),
        path_basename(&spec.flow_path),
        path_basename(&spec.dataset_path),
        spec.rule_id.clone(),
        run_time,
        replicates,
    )?;

    experiment.to_files(
        &spec.output_dir,
        spec.output_predictions,
        &outcome.truth,
        &outcome.lines,
    )?;

    let unknown_predictions = experiment.unknown_counts();
    if unknown_predictions.iter().any(|count| *count > 0) {
        warn!(
            unknown = ?unknown_predictions,
            "some rows never produced a usable answer"
        );
    }

    let manifest = RunManifest {
        manifest_version: 1,
        run_id,
        started_at,
        finished_at: now_utc_string(),
        experiment_name: spec.experiment_name.clone(),
        rule_name: spec.rule_id.clone(),
        flow_path: spec.flow_path.display().to_string(),
        variant: spec.variant.clone(),
        dataset_path: spec.dataset_path.display().to_string(),
        dataset_sha256: sha256_file(&spec.dataset_path)?,
        row_count: outcome.lines.len(),
        num_runs: spec.num_runs,
        num_workers: spec.num_workers,
        retry_max_attempts: spec.retry.max_attempts,
        unknown_predictions,
        metrics_file: experiment
            .metrics_file
            .as_ref()
            .map(|path| path.display().to_string()),
        predictions_dir: experiment
            .predictions_dir
            .as_ref()
            .map(|path| path.display().to_string()),
    };
    let manifest_path = experiment
        .output_dir(&spec.output_dir)
        .join("run_manifest.json");
    write_json_pretty(&manifest_path, &manifest)?;

    info!(
        run_time_secs = run_time,
        mean_accuracy = experiment.mean_metrics.accuracy_score,
        mean_f1 = experiment.mean_metrics.f1,
        "experiment completed"
    );

    Ok(experiment)
}
