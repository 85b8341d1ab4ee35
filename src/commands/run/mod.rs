use anyhow::{Context, Result, bail};
use tracing::info;

use crate::cli::RunArgs;
use crate::config::{Credentials, ExperimentConfig};
use crate::evaluation::TracingMetricSink;
use crate::flow::CommandFlowClient;
use crate::rules::prepare_rule_data;

mod batch;
mod executor;
mod experiment;
mod output;

use executor::RetryPolicy;
use experiment::{ExperimentSpec, run_experiment};

pub fn run(args: RunArgs) -> Result<()> {
    let config = resolve_config(&args)?;
    let credentials = Credentials::from_env()?;

    let rule_data_path = config.resolved_input_data_path();
    for rule_id in &config.rule_ids {
        prepare_rule_data(&rule_data_path, rule_id)
            .with_context(|| format!("rule `{rule_id}` has no rule data"))?;
    }

    let client = CommandFlowClient::new(&args.flow_program, credentials);
    let sink = TracingMetricSink;

    info!(
        experiment = %config.experiment_name,
        rules = config.rule_ids.len(),
        runs = config.num_runs,
        workers = config.num_workers,
        "experiment requested"
    );

    for rule_id in &config.rule_ids {
        let spec = experiment_spec(&config, rule_id);
        let experiment = run_experiment(&client, &sink, &spec)?;
        info!(
            rule = %rule_id,
            metrics_file = %experiment
                .metrics_file
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_default(),
            "rule completed"
        );
    }

    Ok(())
}

fn resolve_config(args: &RunArgs) -> Result<ExperimentConfig> {
    let mut config = ExperimentConfig::load(&args.config)?;

    if let Some(name) = &args.experiment_name {
        config.experiment_name = name.clone();
    }
    if let Some(output_dir) = &args.output_dir {
        config.output_dir = output_dir.clone();
    }
    if let Some(workers) = args.workers {
        config.num_workers = workers;
    }
    if let Some(retry) = args.retry {
        config.retry = retry;
    }
    if args.no_predictions {
        config.output_predictions = false;
    }
    if !args.rules.is_empty() {
        config.rule_ids = select_rules(&config.rule_ids, &args.rules)?;
    }

    config.validate()?;
    Ok(config)
}

/// Narrows the configured rules to `requested`, rejecting ids the config does not define.
fn select_rules(configured: &[String], requested: &[String]) -> Result<Vec<String>> {
    let unknown = requested
        .iter()
        .filter(|rule_id| !configured.contains(rule_id))
        .map(String::as_str)
        .collect::<Vec<&str>>();
    if !unknown.is_empty() {
        bail!(
            "--rule names ids missing from the config rule_ids: {}",
            unknown.join(", ")
        );
    }

    Ok(configured
        .iter()
        .filter(|rule_id| requested.contains(rule_id))
        .cloned()
        .collect())
}

fn experiment_spec(config: &ExperimentConfig, rule_id: &str) -> ExperimentSpec {
    ExperimentSpec {
        experiment_name: config.experiment_name.clone(),
        dataset_path: config.dataset_path.clone(),
        flow_path: config.pf_model_path.clone(),
        input_data_path: config.input_data_path.display().to_string(),
        query_id: config.query_id.clone(),
        rule_id: rule_id.to_string(),
        result_key: config.result_key.clone(),
        variant: config.variant.clone(),
        num_runs: config.num_runs,
        num_workers: config.num_workers,
        retry: RetryPolicy::new(config.retry),
        output_dir: config.output_dir.clone(),
        output_predictions: config.output_predictions,
    }
}
