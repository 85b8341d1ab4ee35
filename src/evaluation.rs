use anyhow::{Result, bail};
use serde_json::Value;
use tracing::{info, warn};

use crate::model::{ClassificationMetrics, Prediction, is_affirmative, truth_to_bool};

/// Receives every metric computed for a replicate.
pub trait MetricSink: Send + Sync {
    fn log_metric(&self, name: &str, value: MetricValue<'_>);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue<'a> {
    Scalar(f64),
    Text(&'a str),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetricSink;

impl MetricSink for TracingMetricSink {
    fn log_metric(&self, name: &str, value: MetricValue<'_>) {
        match value {
            MetricValue::Scalar(value) => info!(metric = name, value, "metric"),
            MetricValue::Text(value) => info!(metric = name, value, "metric"),
        }
    }
}

/// Maps a raw classifier answer onto a [`Prediction`].
pub fn sanitize_prediction(raw: Option<&Value>) -> Prediction {
    match raw {
        Some(Value::String(answer)) => Prediction::from(is_affirmative(answer)),
        Some(Value::Bool(flag)) => Prediction::from(*flag),
        None | Some(Value::Null) => {
            warn!("got no answer from classifier");
            Prediction::Unknown
        }
        Some(other) => {
            warn!(answer = %other, "got non-boolean answer from classifier");
            Prediction::Unknown
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct ConfusionCounts {
    true_negative: usize,
    false_positive: usize,
    false_negative: usize,
    true_positive: usize,
    negative_unknown: usize,
    positive_unknown: usize,
}

impl ConfusionCounts {
    fn tally(predictions: &[Prediction], truth: &[bool]) -> Self {
        let mut counts = Self::default();
        for (prediction, actual) in predictions.iter().zip(truth) {
            match (actual, prediction) {
                (false, Prediction::False) => counts.true_negative += 1,
                (false, Prediction::True) => counts.false_positive += 1,
                (false, Prediction::Unknown) => counts.negative_unknown += 1,
                (true, Prediction::False) => counts.false_negative += 1,
                (true, Prediction::True) => counts.true_positive += 1,
                (true, Prediction::Unknown) => counts.positive_unknown += 1,
            }
        }
        counts
    }

    fn positives(&self) -> usize {
        self.true_positive + self.false_negative + self.positive_unknown
    }

    fn negatives(&self) -> usize {
        self.true_negative + self.false_positive + self.negative_unknown
    }

    fn has_unknown(&self) -> bool {
        self.negative_unknown + self.positive_unknown > 0
    }

    fn matrix(&self) -> Vec<Vec<usize>> {
        if self.has_unknown() {
            vec![
                vec![self.true_negative, self.false_positive, self.negative_unknown],
                vec![self.false_negative, self.true_positive, self.positive_unknown],
                vec![0, 0, 0],
            ]
        } else {
            vec![
                vec![self.true_negative, self.false_positive],
                vec![self.false_negative, self.true_positive],
            ]
        }
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Computes binary classification metrics and reports each one to `sink`.
///
/// Unknown predictions never count as positive or as correct, so they lower
/// recall, accuracy and balanced accuracy but leave precision untouched. When
/// any are present the confusion matrix grows an `unknown` column.
pub fn calculate_metrics(
    predictions: &[Prediction],
    truth: &[Value],
    sink: &dyn MetricSink,
) -> Result<ClassificationMetrics> {
    if predictions.len() != truth.len() {
        bail!(
            "prediction count {} does not match truth count {}",
            predictions.len(),
            truth.len()
        );
    }

    let truth = truth.iter().map(truth_to_bool).collect::<Vec<bool>>();
    let counts = ConfusionCounts::tally(predictions, &truth);

    let recall = ratio(counts.true_positive, counts.positives());
    let precision = ratio(
        counts.true_positive,
        counts.true_positive + counts.false_positive,
    );
    let f1 = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };
    let accuracy_score = ratio(
        counts.true_positive + counts.true_negative,
        predictions.len(),
    );

    let mut class_recalls = Vec::with_capacity(2);
    if counts.positives() > 0 {
        class_recalls.push(recall);
    }
    if counts.negatives() > 0 {
        class_recalls.push(ratio(counts.true_negative, counts.negatives()));
    }
    let balanced_accuracy_score = if class_recalls.is_empty() {
        0.0
    } else {
        class_recalls.iter().sum::<f64>() / class_recalls.len() as f64
    };

    let metrics = ClassificationMetrics {
        recall,
        precision,
        f1,
        accuracy_score,
        balanced_accuracy_score,
        confusion_matrix: format_confusion_matrix(&counts.matrix()),
    };

    sink.log_metric("recall", MetricValue::Scalar(metrics.recall));
    sink.log_metric("precision", MetricValue::Scalar(metrics.precision));
    sink.log_metric("f1", MetricValue::Scalar(metrics.f1));
    sink.log_metric("accuracy_score", MetricValue::Scalar(metrics.accuracy_score));
    sink.log_metric(
        "balanced_accuracy_score",
        MetricValue::Scalar(metrics.balanced_accuracy_score),
    );
    sink.log_metric(
        "confusion_matrix",
        MetricValue::Text(&metrics.confusion_matrix),
    );

    Ok(metrics)
}

/// Renders a matrix the way numpy prints it, with row breaks replaced by commas.
fn format_confusion_matrix(matrix: &[Vec<usize>]) -> String {
    let width = matrix
        .iter()
        .flatten()
        .map(|value| value.to_string().len())
        .max()
        .unwrap_or(1);

    let rows = matrix
        .iter()
        .map(|row| {
            let cells = row
                .iter()
                .map(|value| format!("{value:>width$}"))
                .collect::<Vec<String>>()
                .join(" ");
            format!("[{cells}]")
        })
        .collect::<Vec<String>>();

    format!("[{}]", rows.join(", "))
}
