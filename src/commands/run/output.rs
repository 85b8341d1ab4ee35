use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use serde_json::Value;
use tracing::info;

use crate::model::{
    AllMetrics, ClassificationMetrics, MeanMetrics, MetricsFile, Prediction, PredictionRecord,
    truth_to_bool,
};
use crate::util::{ensure_directory, write_json_pretty, write_jsonl};

/// One full pass over the dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Replicate {
    pub metrics: ClassificationMetrics,
    pub predictions: Vec<Prediction>,
}

impl Replicate {
    fn prediction_records(&self, truth: &[Value], lines: &[String]) -> Vec<PredictionRecord> {
        self.predictions
            .iter()
            .zip(truth)
            .zip(lines)
            .map(|((prediction, truth), line)| PredictionRecord {
                line: line.clone(),
                prediction: *prediction,
                truth: truth_to_bool(truth),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentOutput {
    pub experiment_name: String,
    pub model_name: String,
    pub dataset_ver: String,
    pub rule_name: String,
    pub num_runs: usize,
    pub run_time: f64,
    pub replicates: Vec<Replicate>,
    pub all_metrics: AllMetrics,
    pub mean_metrics: MeanMetrics,
    pub metrics_file: Option<PathBuf>,
    pub predictions_dir: Option<PathBuf>,
}

impl ExperimentOutput {
    pub fn new(
        experiment_name: String,
        model_name: String,
        dataset_ver: String,
        rule_name: String,
        run_time: f64,
        replicates: Vec<Replicate>,
    ) -> Result<Self> {
        if replicates.is_empty() {
            bail!("cannot aggregate an experiment without replicates");
        }

        let mut all_metrics = AllMetrics::default();
        for replicate in &replicates {
            all_metrics.push(&replicate.metrics);
        }
        let mean_metrics = MeanMetrics::from_all(&all_metrics);

        Ok(Self {
            experiment_name,
            model_name,
            dataset_ver,
            rule_name,
            num_runs: replicates.len(),
            run_time,
            replicates,
            all_metrics,
            mean_metrics,
            metrics_file: None,
            predictions_dir: None,
        })
    }

    /// `<output_root>/results/<experiment>/<rule>`
    pub fn output_dir(&self, output_root: &Path) -> PathBuf {
        output_root
            .join("results")
            .join(&self.experiment_name)
            .join(&self.rule_name)
    }

    /// Writes `metrics.json` and, when requested, one JSONL file per replicate.
    pub fn to_files(
        &mut self,
        output_root: &Path,
        write_predictions: bool,
        truth: &[Value],
        lines: &[String],
    ) -> Result<()> {
        let output_dir = self.output_dir(output_root);
        ensure_directory(&output_dir)?;

        if write_predictions {
            let predictions_dir = output_dir.join("runs");
            ensure_directory(&predictions_dir)?;
            for (index, replicate) in self.replicates.iter().enumerate() {
                let path = predictions_dir.join(format!("replicate_{index:03}.jsonl"));
                write_jsonl(&path, &replicate.prediction_records(truth, lines))?;
            }
            info!(path = %predictions_dir.display(), "wrote replicate predictions");
            self.predictions_dir = Some(predictions_dir);
        }

        let metrics_file = output_dir.join("metrics.json");
        write_json_pretty(&metrics_file, &self.metrics_payload())?;
        info!(path = %metrics_file.display(), "wrote experiment metrics");
        self.metrics_file = Some(metrics_file);

        Ok(())
    }

    pub fn metrics_payload(&self) -> MetricsFile {
        MetricsFile {
            model_name: self.model_name.clone(),
            rule_name: self.rule_name.clone(),
            dataset_ver: self.dataset_ver.clone(),
            mean_metrics: Some(self.mean_metrics.clone()),
            all_metrics: self.all_metrics.clone(),
            run_time: self.run_time,
            num_runs: self.num_runs,
            predictions_dir: self
                .predictions_dir
                .as_ref()
                .map(|path| path.display().to_string()),
        }
    }

    pub fn unknown_counts(&self) -> Vec<usize> {
        self.replicates
            .iter()
            .map(|replicate| {
                replicate
                    .predictions
                    .iter()
                    .filter(|prediction| !prediction.is_known())
                    .count()
            })
            .collect()
    }
}
