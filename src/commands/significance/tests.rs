use std::path::Path;

use super::stats::{one_sample_t_test, student_t_two_sided_p};
use super::*;
use crate::model::{AllMetrics, MetricsFile};
use crate::util::parse_csv;

fn write_metrics(root: &Path, hypothesis: &str, rule_id: &str, recall: Vec<f64>) {
    let runs = recall.len();
    let payload = MetricsFile {
        model_name: hypothesis.to_string(),
        rule_name: rule_id.to_string(),
        dataset_ver: "reqs.json".to_string(),
        mean_metrics: None,
        all_metrics: AllMetrics::from_samples([
            (Metric::Recall, recall),
            (Metric::Precision, vec![0.5; runs]),
        ]),
        run_time: 1.0,
        num_runs: runs,
        predictions_dir: None,
    };
    write_json_pretty(
        &root.join(hypothesis).join(rule_id).join("metrics.json"),
        &payload,
    )
    .expect("write metrics");
}

#[test]
fn t_test_matches_reference_values() {
    let (t, p) = one_sample_t_test(&[1.0, 2.0, 3.0, 4.0, 5.0], 2.0);
    assert!((t - std::f64::consts::SQRT_2).abs() < 1e-9, "t = {t}");
    assert!((p - 0.2302).abs() < 1e-3, "p = {p}");
}

#[test]
fn two_sided_p_tracks_known_critical_values() {
    assert!((student_t_two_sided_p(2.228, 10.0) - 0.05).abs() < 1e-3);
    assert!((student_t_two_sided_p(1.96, 1_000.0) - 0.05).abs() < 1e-3);
    assert!((student_t_two_sided_p(0.0, 5.0) - 1.0).abs() < 1e-12);
}

#[test]
fn zero_variance_samples_are_edge_cases_not_failures() {
    let (t, p) = one_sample_t_test(&[0.75, 0.75, 0.75], 0.75);
    assert!(t.is_nan());
    assert!(p.is_nan());

    let (t, p) = one_sample_t_test(&[0.875, 0.875, 0.875], 0.5);
    assert_eq!(t, f64::INFINITY);
    assert_eq!(p, 0.0);

    let (t, _) = one_sample_t_test(&[0.9], 0.8);
    assert!(t.is_nan());
}

#[test]
fn missing_baseline_short_circuits_without_reading_results() {
    let outcome = student_t_test(
        Path::new("/nonexistent/results"),
        "hypothesis001",
        "r3",
        Metric::Recall,
        f64::NAN,
    )
    .expect("missing baseline is not an error");
    assert!(outcome.t_statistic.is_nan());
    assert!(outcome.p_value.is_nan());
}

#[test]
fn baseline_table_reads_rule_index_and_blank_cells() {
    let table = parse_csv("rule,recall,precision\nr3,0.6,\nr7,0.4,0.9\n").expect("csv");
    let baseline = BaselineTable::from_csv(&table).expect("baseline");

    assert_eq!(baseline.value("r3", Metric::Recall), 0.6);
    assert!(baseline.value("r3", Metric::Precision).is_nan());
    assert!(baseline.value("r9", Metric::Recall).is_nan());
    assert!(baseline.value("r7", Metric::F1).is_nan());
}

#[test]
fn loop_flags_directional_and_two_tailed_rejections() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_metrics(dir.path(), "hypothesis001", "r3", vec![0.90, 0.92, 0.91, 0.93]);
    write_metrics(dir.path(), "hypothesis001", "r7", vec![0.40, 0.60, 0.50, 0.55]);

    let table = parse_csv("rule,recall,precision\nr3,0.5,0.5\nr7,0.5,\n").expect("csv");
    let baseline = BaselineTable::from_csv(&table).expect("baseline");

    let records = loop_hypothesis_tests(
        dir.path(),
        &baseline,
        &["hypothesis001".to_string()],
        &[Metric::Recall, Metric::Precision],
        &["r3".to_string(), "r7".to_string()],
        DEFAULT_ALPHA,
    )
    .expect("tests should run");

    assert_eq!(records.len(), 4);

    let r3_recall = &records[0];
    assert_eq!(r3_recall.rule_id, "r3");
    assert_eq!(r3_recall.metric_name, "recall");
    assert!(r3_recall.reject_h0_twotail);
    assert!(r3_recall.reject_h0_onetail);
    assert!((r3_recall.sample_metric - 0.915).abs() < 1e-12);

    let r7_recall = &records[1];
    assert!(!r7_recall.reject_h0_twotail);
    assert!(!r7_recall.reject_h0_onetail);

    let r3_precision = &records[2];
    assert!(r3_precision.t_student.is_nan());
    assert!(!r3_precision.reject_h0_twotail);

    let r7_precision = &records[3];
    assert!(r7_precision.null_metric.is_nan());
    assert!(!r7_precision.reject_h0_onetail);
}

#[test]
fn loop_propagates_missing_result_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let table = parse_csv("rule,recall\nr3,0.5\n").expect("csv");
    let baseline = BaselineTable::from_csv(&table).expect("baseline");

    let err = loop_hypothesis_tests(
        dir.path(),
        &baseline,
        &["hypothesis009".to_string()],
        &[Metric::Recall],
        &["r3".to_string()],
        DEFAULT_ALPHA,
    )
    .expect_err("results are missing");
    assert!(err.to_string().contains("metrics.json"));
}
