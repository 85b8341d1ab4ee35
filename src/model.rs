use std::fmt;
use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::util::read_json;

pub const TEXT_KEY: &str = "text";
pub const AFFIRMATIVE_ANSWERS: [&str; 3] = ["yes", "correct", "true"];

/// Classifier answer after sanitization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Prediction {
    True,
    False,
    Unknown,
}

impl Prediction {
    pub fn is_known(self) -> bool {
        !matches!(self, Self::Unknown)
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            Self::True => Some(true),
            Self::False => Some(false),
            Self::Unknown => None,
        }
    }
}

impl From<bool> for Prediction {
    fn from(value: bool) -> Self {
        if value { Self::True } else { Self::False }
    }
}

impl Serialize for Prediction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.as_bool() {
            Some(value) => serializer.serialize_bool(value),
            None => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for Prediction {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Option::<bool>::deserialize(deserializer)?;
        Ok(value.map(Self::from).unwrap_or(Self::Unknown))
    }
}

/// Case-insensitive match against [`AFFIRMATIVE_ANSWERS`]; surrounding whitespace is not ignored.
pub fn is_affirmative(answer: &str) -> bool {
    let normalized = answer.to_lowercase();
    AFFIRMATIVE_ANSWERS.contains(&normalized.as_str())
}

/// Coerces a raw ground-truth label to a boolean.
///
/// String labels go through the affirmative vocabulary (trimmed), so `"no"`
/// and `"false"` are false. This differs from plain truthiness, where every
/// non-empty string would count as true.
pub fn truth_to_bool(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map(|n| n != 0.0).unwrap_or(false),
        Value::String(text) => is_affirmative(text.trim()),
        Value::Null => false,
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetRow {
    pub text: String,
    pub query: Value,
    pub truth: Value,
}

pub fn load_dataset(path: &Path, query_id: &str, rule_id: &str) -> Result<Vec<DatasetRow>> {
    let raw: Value = read_json(path)?;
    parse_dataset(raw, query_id, rule_id)
        .with_context(|| format!("invalid dataset: {}", path.display()))
}

pub fn parse_dataset(raw: Value, query_id: &str, rule_id: &str) -> Result<Vec<DatasetRow>> {
    let Value::Array(items) = raw else {
        bail!("dataset must be a JSON array of row objects");
    };

    let mut rows = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let Value::Object(mut fields) = item else {
            bail!("dataset row {index} is not a JSON object");
        };

        let query = fields
            .get(query_id)
            .cloned()
            .with_context(|| format!("dataset row {index} is missing query key `{query_id}`"))?;
        let truth = fields
            .remove(rule_id)
            .with_context(|| format!("dataset row {index} is missing rule key `{rule_id}`"))?;
        let text = match fields.remove(TEXT_KEY) {
            Some(Value::String(text)) => text,
            Some(other) => other.to_string(),
            None => bail!("dataset row {index} is missing key `{TEXT_KEY}`"),
        };

        rows.push(DatasetRow { text, query, truth });
    }

    Ok(rows)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub recall: f64,
    pub precision: f64,
    pub f1: f64,
    pub accuracy_score: f64,
    pub balanced_accuracy_score: f64,
    pub confusion_matrix: String,
}

impl ClassificationMetrics {
    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Recall => self.recall,
            Metric::Precision => self.precision,
            Metric::F1 => self.f1,
            Metric::AccuracyScore => self.accuracy_score,
            Metric::BalancedAccuracyScore => self.balanced_accuracy_score,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, ValueEnum)]
pub enum Metric {
    #[value(name = "recall")]
    Recall,
    #[value(name = "precision")]
    Precision,
    #[value(name = "f1")]
    F1,
    #[value(name = "accuracy_score")]
    AccuracyScore,
    #[value(name = "balanced_accuracy_score")]
    BalancedAccuracyScore,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::Recall,
        Metric::Precision,
        Metric::F1,
        Metric::AccuracyScore,
        Metric::BalancedAccuracyScore,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Recall => "recall",
            Self::Precision => "precision",
            Self::F1 => "f1",
            Self::AccuracyScore => "accuracy_score",
            Self::BalancedAccuracyScore => "balanced_accuracy_score",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-replicate metric values, in replicate order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllMetrics {
    pub recall: Vec<f64>,
    pub precision: Vec<f64>,
    pub f1: Vec<f64>,
    pub accuracy_score: Vec<f64>,
    pub balanced_accuracy_score: Vec<f64>,
    #[serde(default)]
    pub confusion_matrix: Vec<String>,
}

impl AllMetrics {
    pub fn values(&self, metric: Metric) -> &[f64] {
        match metric {
            Metric::Recall => &self.recall,
            Metric::Precision => &self.precision,
            Metric::F1 => &self.f1,
            Metric::AccuracyScore => &self.accuracy_score,
            Metric::BalancedAccuracyScore => &self.balanced_accuracy_score,
        }
    }

    fn values_mut(&mut self, metric: Metric) -> &mut Vec<f64> {
        match metric {
            Metric::Recall => &mut self.recall,
            Metric::Precision => &mut self.precision,
            Metric::F1 => &mut self.f1,
            Metric::AccuracyScore => &mut self.accuracy_score,
            Metric::BalancedAccuracyScore => &mut self.balanced_accuracy_score,
        }
    }

    pub fn push(&mut self, metrics: &ClassificationMetrics) {
        for metric in Metric::ALL {
            self.values_mut(metric).push(metrics.value(metric));
        }
        self.confusion_matrix.push(metrics.confusion_matrix.clone());
    }

    pub fn from_samples(samples: impl IntoIterator<Item = (Metric, Vec<f64>)>) -> Self {
        let mut all = Self::default();
        for (metric, values) in samples {
            *all.values_mut(metric) = values;
        }
        all
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeanMetrics {
    pub recall: f64,
    pub precision: f64,
    pub f1: f64,
    pub accuracy_score: f64,
    pub balanced_accuracy_score: f64,
}

impl MeanMetrics {
    pub fn from_all(all: &AllMetrics) -> Self {
        Self {
            recall: mean(all.values(Metric::Recall)),
            precision: mean(all.values(Metric::Precision)),
            f1: mean(all.values(Metric::F1)),
            accuracy_score: mean(all.values(Metric::AccuracyScore)),
            balanced_accuracy_score: mean(all.values(Metric::BalancedAccuracyScore)),
        }
    }

    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Recall => self.recall,
            Metric::Precision => self.precision,
            Metric::F1 => self.f1,
            Metric::AccuracyScore => self.accuracy_score,
            Metric::BalancedAccuracyScore => self.balanced_accuracy_score,
        }
    }
}

/// Contents of `metrics.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsFile {
    pub model_name: String,
    pub rule_name: String,
    pub dataset_ver: String,
    pub mean_metrics: Option<MeanMetrics>,
    pub all_metrics: AllMetrics,
    pub run_time: f64,
    pub num_runs: usize,
    pub predictions_dir: Option<String>,
}

/// One line of `replicate_NNN.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub line: String,
    pub prediction: Prediction,
    pub truth: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub experiment_name: String,
    pub rule_name: String,
    pub flow_path: String,
    pub variant: String,
    pub dataset_path: String,
    pub dataset_sha256: String,
    pub row_count: usize,
    pub num_runs: usize,
    pub num_workers: usize,
    pub retry_max_attempts: usize,
    pub unknown_predictions: Vec<usize>,
    pub metrics_file: Option<String>,
    pub predictions_dir: Option<String>,
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (ddof = 0).
pub fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let center = mean(values);
    let variance =
        values.iter().map(|value| (value - center).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}
