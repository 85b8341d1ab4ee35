use std::fs;
use std::path::Path;

use super::models::collect_model_means;
use super::rules::collect_rule_means;
use super::runs::collect_rule_runs;
use crate::model::{AllMetrics, Metric, MetricsFile};
use crate::util::{write_csv, write_json_pretty};

fn write_metrics(dir: &Path, model: &str, rule: &str, recall: Vec<f64>) {
    let runs = recall.len();
    let payload = MetricsFile {
        model_name: model.to_string(),
        rule_name: rule.to_string(),
        dataset_ver: "reqs.json".to_string(),
        mean_metrics: None,
        all_metrics: AllMetrics::from_samples([
            (Metric::Recall, recall),
            (Metric::Precision, vec![1.0; runs]),
            (Metric::F1, vec![0.5; runs]),
            (Metric::AccuracyScore, vec![0.25; runs]),
            (Metric::BalancedAccuracyScore, vec![0.75; runs]),
        ]),
        run_time: 2.5,
        num_runs: runs,
        predictions_dir: None,
    };
    write_json_pretty(&dir.join(model).join(rule).join("metrics.json"), &payload)
        .expect("write metrics");
}

#[test]
fn rule_means_round_and_use_population_std() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_metrics(dir.path(), "hypothesis001", "r3", vec![0.5, 1.0]);
    write_metrics(dir.path(), "hypothesis001", "r7", vec![1.0 / 3.0; 3]);

    let table = collect_rule_means(&dir.path().join("hypothesis001")).expect("collect");

    assert_eq!(table.header[0], "rule");
    assert_eq!(table.header[1], "recall");
    assert_eq!(table.header[2], "recall_2std");
    assert_eq!(table.header[10], "balanced_accuracy_score_2std");

    let r3 = &table.rows[0];
    assert_eq!(r3[0], "r3");
    assert_eq!(r3[1], "0.75");
    // population std of [0.5, 1.0] is 0.25
    assert_eq!(r3[2], "0.5");
    assert_eq!(r3[3], "1");
    assert_eq!(r3[4], "0");

    let r7 = &table.rows[1];
    assert_eq!(r7[0], "r7");
    assert_eq!(r7[1], "0.333");
    assert_eq!(r7[2], "0");
}

#[test]
fn rule_means_require_existing_folder() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = collect_rule_means(&dir.path().join("missing")).expect_err("missing folder");
    assert!(err.to_string().contains("missing"));
}

#[test]
fn model_means_skip_aggregate_folders_and_tag_rows() {
    let dir = tempfile::tempdir().expect("tempdir");
    let results = dir.path();
    write_metrics(results, "hypothesis001", "r3", vec![0.5, 1.0]);
    write_metrics(results, "hypothesis002", "r3", vec![0.25, 0.25]);
    fs::create_dir_all(results.join("statistical_tests")).expect("mkdir");

    for model in ["hypothesis001", "hypothesis002"] {
        let table = collect_rule_means(&results.join(model)).expect("collect");
        write_csv(&results.join(model).join("mean_metrics.csv"), &table).expect("write");
    }
    let stale = collect_rule_means(&results.join("hypothesis001")).expect("collect");
    write_csv(&results.join("all").join("mean_metrics.csv"), &stale).expect("write");

    let table = collect_model_means(results).expect("collect models");

    assert_eq!(table.header.last().map(String::as_str), Some("model"));
    assert_eq!(table.rows.len(), 2);
    assert_eq!(table.rows[0].last().map(String::as_str), Some("hypothesis001"));
    assert_eq!(table.rows[1].last().map(String::as_str), Some("hypothesis002"));
    assert_eq!(table.rows[1][1], "0.25");
}

#[test]
fn rule_runs_are_long_format_and_skip_missing_models() {
    let dir = tempfile::tempdir().expect("tempdir");
    let results = dir.path();
    write_metrics(results, "hypothesis001", "r3", vec![0.5, 1.0]);
    write_metrics(results, "hypothesis002", "r7", vec![0.25]);

    let table = collect_rule_runs(results, "r3").expect("collect runs");

    assert_eq!(
        table.header,
        vec![
            "recall",
            "precision",
            "f1",
            "accuracy_score",
            "balanced_accuracy_score",
            "run_idx",
            "rule_id",
            "model",
        ]
    );
    assert_eq!(table.rows.len(), 2);
    assert_eq!(table.rows[1][0], "1");
    assert_eq!(table.rows[1][5], "1");
    assert_eq!(table.rows[1][6], "r3");
    assert_eq!(table.rows[1][7], "hypothesis001");
}
