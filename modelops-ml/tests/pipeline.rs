//! Local pipeline: data check, train, write metrics, gate.

use modelops_core::config::DataContractConfig;
use modelops_ml::data::{CsvSource, DataContract, Dataset, check_contract};
use modelops_ml::gate::run_gate;
use modelops_ml::training::{
    RegressionMetrics, RegressionModel, TrainOutputs, TrainParams, run_training, write_outputs,
};
use std::path::PathBuf;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

#[test]
fn test_fixture_satisfies_contract() {
    let batch = CsvSource::new(fixture("data.csv")).load().unwrap();
    let report = check_contract(&batch, &DataContract::from(&DataContractConfig::default()));
    assert!(report.passed(), "{:?}", report.violations);
    assert_eq!(report.rows, 10);
    assert_eq!(report.columns, 2);
}

#[test]
fn test_train_then_gate() {
    let dir = tempfile::tempdir().unwrap();
    let params = TrainParams::load(&fixture("params.yaml")).unwrap();
    let dataset = Dataset::load_csv(&fixture("data.csv"), "feature", "target").unwrap();

    let report = run_training(&dataset, &params).unwrap();
    assert_eq!((report.train_rows, report.test_rows), (8, 2));
    assert!(report.metrics.r2 > 0.9, "r2 = {}", report.metrics.r2);

    let outputs = TrainOutputs {
        model: dir.path().join("model.json"),
        metrics_json: dir.path().join("metrics.json"),
        metrics_txt: dir.path().join("metrics.txt"),
    };
    write_outputs(&report, &outputs).unwrap();

    let model = RegressionModel::load(&outputs.model).unwrap();
    assert!((model.coef - 2.0).abs() < 0.2);
    assert_eq!(
        RegressionMetrics::read_json(&outputs.metrics_json).unwrap(),
        report.metrics
    );

    let threshold = dir.path().join("expected_min_r2.txt");
    std::fs::write(&threshold, "0.80\n").unwrap();
    let outcome = run_gate(&outputs.metrics_txt, &threshold).unwrap();
    assert_eq!(outcome.exit_code(), 0);

    std::fs::write(&threshold, "0.99999\n").unwrap();
    std::fs::write(&outputs.metrics_txt, "R2: 0.5000\n").unwrap();
    assert_eq!(run_gate(&outputs.metrics_txt, &threshold).unwrap().exit_code(), 1);
}

#[test]
fn test_bad_csv_breaks_contract() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.csv");
    std::fs::write(&path, "feature,label\n1,a\n2,b\n").unwrap();

    let batch = CsvSource::new(&path).load().unwrap();
    let report = check_contract(&batch, &DataContract::from(&DataContractConfig::default()));
    assert!(!report.passed());
    let messages: Vec<String> = report.violations.iter().map(ToString::to_string).collect();
    assert!(messages.contains(&"column 'target' is missing".to_string()));
    assert!(messages.contains(&"found 2 rows, need at least 3".to_string()));
}
