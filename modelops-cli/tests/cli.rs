//! Exit codes and output of the `modelops` binary.

use modelops_core::config::LEGACY_ENV_VARS;
use pretty_assertions::assert_eq;
use std::path::Path;
use std::process::{Command, Output};

fn modelops(workspace: &Path, args: &[&str]) -> Output {
    modelops_with_env(workspace, args, &[])
}

fn modelops_with_env(workspace: &Path, args: &[&str], env: &[(&str, &str)]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_modelops"));
    cmd.current_dir(workspace)
        .arg("--workspace")
        .arg(workspace)
        .arg("--quiet")
        .args(args);
    for var in LEGACY_ENV_VARS {
        cmd.env_remove(var);
    }
    cmd.envs(env.iter().copied());
    cmd.output().unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn write(dir: &Path, name: &str, body: &str) {
    std::fs::write(dir.join(name), body).unwrap();
}

const DATA: &str = "feature,target\n1,3.1\n2,4.9\n3,7.2\n4,8.8\n5,11.1\n6,13.0\n7,14.8\n8,17.2\n9,19.1\n10,20.9\n";

#[test]
fn test_gate_passes() {
    let ws = tempfile::tempdir().unwrap();
    write(ws.path(), "metrics.txt", "R2: 0.87\n");
    write(ws.path(), "expected_min_r2.txt", "0.80\n");

    let out = modelops(ws.path(), &["gate"]);
    assert_eq!(out.status.code(), Some(0));
    assert_eq!(
        stdout(&out),
        "Current R2=0.8700 / Threshold=0.8000\nGate passed.\n"
    );
}

#[test]
fn test_gate_fails_below_threshold() {
    let ws = tempfile::tempdir().unwrap();
    write(ws.path(), "metrics.txt", "Model: Ridge, R2: 0.42");
    write(ws.path(), "expected_min_r2.txt", "0.80");

    let out = modelops(ws.path(), &["gate"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stdout(&out).contains("Gate failed: R2 below threshold."));
}

#[test]
fn test_gate_missing_metrics_exits_2() {
    let ws = tempfile::tempdir().unwrap();
    write(ws.path(), "expected_min_r2.txt", "0.80");

    let out = modelops(ws.path(), &["gate"]);
    assert_eq!(out.status.code(), Some(2));
    let text = stdout(&out);
    assert!(text.contains("metrics.txt not found. Did training run?"), "{text}");
    assert!(!stderr(&out).contains("[FATAL]"));
}

#[test]
fn test_gate_without_r2_exits_2() {
    let ws = tempfile::tempdir().unwrap();
    write(ws.path(), "metrics.txt", "accuracy: 0.9\n");
    write(ws.path(), "expected_min_r2.txt", "0.80");

    let out = modelops(ws.path(), &["gate"]);
    assert_eq!(out.status.code(), Some(2));
    assert!(stdout(&out).contains("Could not parse R2 from"));
}

#[test]
fn test_gate_fails_on_negative_r2() {
    let ws = tempfile::tempdir().unwrap();
    write(ws.path(), "metrics.txt", "R2: -0.2500\nMAE: 3.1000\n");
    write(ws.path(), "expected_min_r2.txt", "0.80");

    let out = modelops(ws.path(), &["gate"]);
    assert_eq!(out.status.code(), Some(1));
    assert_eq!(
        stdout(&out),
        "Current R2=-0.2500 / Threshold=0.8000\nGate failed: R2 below threshold.\n"
    );
}

#[test]
fn test_offline_steps_ignore_bad_tracking_env() {
    let ws = tempfile::tempdir().unwrap();
    write(ws.path(), "metrics.txt", "R2: 0.87\n");
    write(ws.path(), "expected_min_r2.txt", "0.80\n");
    write(ws.path(), "data.csv", DATA);
    let env = [
        ("HTTP_TIMEOUT_SEC", "soon"),
        ("MLFLOW_TRACKING_URI", "ftp://tracker"),
    ];

    let out = modelops_with_env(ws.path(), &["gate"], &env);
    assert_eq!(out.status.code(), Some(0), "{}", stderr(&out));

    let out = modelops_with_env(ws.path(), &["check-data"], &env);
    assert_eq!(out.status.code(), Some(0), "{}", stderr(&out));

    let out = modelops_with_env(ws.path(), &["promote"], &env);
    assert_eq!(out.status.code(), Some(2));
    assert!(stderr(&out).contains("HTTP_TIMEOUT_SEC"));
}

#[test]
fn test_check_data() {
    let ws = tempfile::tempdir().unwrap();
    write(ws.path(), "data.csv", DATA);
    let out = modelops(ws.path(), &["check-data"]);
    assert_eq!(out.status.code(), Some(0));
    assert!(stdout(&out).starts_with("[OK] "));

    write(ws.path(), "short.csv", "feature,target\n1,x\n");
    let out = modelops(ws.path(), &["check-data", "--data", "short.csv"]);
    assert_eq!(out.status.code(), Some(2));
    let text = stdout(&out);
    assert!(text.contains("[FAIL] column 'target' is string"), "{text}");
    assert!(text.contains("[FAIL] found 1 rows, need at least 3"), "{text}");
}

#[test]
fn test_train_then_gate() {
    let ws = tempfile::tempdir().unwrap();
    write(ws.path(), "data.csv", DATA);
    write(
        ws.path(),
        "params.yaml",
        "train:\n  fit_intercept: true\n  test_size: 0.2\n  random_state: 42\n",
    );
    write(ws.path(), "expected_min_r2.txt", "0.5\n");

    let out = modelops(ws.path(), &["train"]);
    assert_eq!(out.status.code(), Some(0), "{}", stderr(&out));
    assert!(stdout(&out).starts_with("Model: LinearRegression, R2: "));
    for file in ["model.json", "metrics.json", "metrics.txt"] {
        assert!(ws.path().join(file).exists(), "{file} missing");
    }

    let out = modelops(ws.path(), &["gate"]);
    assert_eq!(out.status.code(), Some(0));
}

#[test]
fn test_train_without_params_section_is_fatal() {
    let ws = tempfile::tempdir().unwrap();
    write(ws.path(), "data.csv", DATA);
    write(ws.path(), "params.yaml", "other: {}\n");

    let out = modelops(ws.path(), &["train"]);
    assert_eq!(out.status.code(), Some(2));
    assert!(stderr(&out).starts_with("[FATAL] "));
}

#[test]
fn test_config_init_and_show() {
    let ws = tempfile::tempdir().unwrap();
    let out = modelops(ws.path(), &["config", "init"]);
    assert_eq!(out.status.code(), Some(0));
    assert!(ws.path().join(".modelops/config.toml").exists());

    let out = modelops(ws.path(), &["config", "init"]);
    assert!(stdout(&out).starts_with("Configuration file already exists"));

    let out = modelops(ws.path(), &["config", "show"]);
    assert_eq!(out.status.code(), Some(0));
    let shown = stdout(&out);
    assert!(shown.contains("[tracking]"));
    assert!(shown.contains("[registry]"));
}

#[test]
fn test_promote_against_unreachable_server() {
    let ws = tempfile::tempdir().unwrap();
    let out = modelops(
        ws.path(),
        &["--tracking-uri", "http://127.0.0.1:1", "promote"],
    );
    assert_eq!(out.status.code(), Some(2));
    let err = stderr(&out);
    assert!(
        err.contains("MLflow URI not reachable from this process: http://127.0.0.1:1"),
        "{err}"
    );
    assert!(err.contains("curl -i http://127.0.0.1:1/api/2.0/mlflow/experiments/get-by-name"));
}

#[test]
fn test_invalid_tracking_uri_is_rejected() {
    let ws = tempfile::tempdir().unwrap();
    let out = modelops(ws.path(), &["--tracking-uri", "ftp://tracker", "promote"]);
    assert_eq!(out.status.code(), Some(2));
    assert!(stderr(&out).contains("tracking.uri"));
}
