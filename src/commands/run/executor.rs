use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use tracing::warn;

use crate::evaluation::sanitize_prediction;
use crate::flow::{FlowClient, FlowInputs, FlowRequest, extract_answer};
use crate::model::{DatasetRow, Prediction};

/// Bounded retry for answers that come back empty or unparseable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::from_secs(1),
        }
    }

    /// Wait after the `failures`-th unusable answer: `base_delay * 2^failures`.
    pub fn backoff(&self, failures: usize) -> Duration {
        let exponent = u32::try_from(failures).unwrap_or(u32::MAX).min(16);
        self.base_delay.saturating_mul(1_u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_RETRY)
    }
}

/// Which flow to call and how to read its answer. Shared by every row.
#[derive(Debug, Clone)]
pub struct FlowTarget<'a> {
    pub flow_path: &'a Path,
    pub variant: &'a str,
    pub result_key: &'a str,
    pub rule_id: &'a str,
    pub data_file: &'a str,
}

/// Classifies one row `runs` times, retrying unusable answers per attempt.
///
/// Client failures are returned as errors; only answers that sanitize to
/// [`Prediction::Unknown`] are retried. An attempt that never produces a usable
/// answer within the retry budget is recorded as unknown.
pub fn process_flow(
    client: &dyn FlowClient,
    row: &DatasetRow,
    target: &FlowTarget<'_>,
    runs: usize,
    retry: &RetryPolicy,
) -> Result<Vec<Prediction>> {
    let inputs = FlowInputs {
        query: row.query.clone(),
        truth: row.truth.clone(),
        rule_id: target.rule_id.to_string(),
        data_file: target.data_file.to_string(),
    };
    let request = FlowRequest {
        flow_path: target.flow_path,
        variant: target.variant,
        inputs: &inputs,
    };

    let max_attempts = retry.max_attempts.max(1);
    let mut results = Vec::with_capacity(runs);

    while results.len() < runs {
        let mut failures = 0usize;
        let prediction = loop {
            let response = client.invoke(&request)?;
            let prediction = sanitize_prediction(extract_answer(&response, target.result_key).as_ref());
            if prediction.is_known() {
                break prediction;
            }

            failures += 1;
            if failures >= max_attempts {
                warn!(
                    line = %row.text,
                    attempts = failures,
                    "failed to get an answer"
                );
                break Prediction::Unknown;
            }
            thread::sleep(retry.backoff(failures));
        };

        results.push(prediction);
    }

    Ok(results)
}
