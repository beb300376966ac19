//! Layered config files on disk.
//!
//! Assertions stick to fields no legacy environment name overrides, so the
//! tests hold regardless of the CI environment.

use modelops_core::config::{
    ModelOpsConfig, load_config, load_local_config, workspace_config_path, write_default_config,
};
use pretty_assertions::assert_eq;
use std::path::PathBuf;

#[test]
fn test_defaults_round_trip_through_init() {
    let ws = tempfile::tempdir().unwrap();
    let written = write_default_config(ws.path()).unwrap().unwrap();
    assert_eq!(written, workspace_config_path(ws.path()));

    let config = load_config(Some(ws.path()), None).unwrap();
    assert_eq!(config.paths, ModelOpsConfig::default().paths);
    assert_eq!(config.data, ModelOpsConfig::default().data);
}

#[test]
fn test_explicit_file_overrides_workspace() {
    let ws = tempfile::tempdir().unwrap();
    let ws_config = workspace_config_path(ws.path());
    std::fs::create_dir_all(ws_config.parent().unwrap()).unwrap();
    std::fs::write(
        &ws_config,
        "[data]\nmin_rows = 5\n\n[paths]\nmodel = \"ws-model.json\"\n",
    )
    .unwrap();

    let explicit = ws.path().join("ci.toml");
    std::fs::write(&explicit, "[paths]\nmodel = \"ci-model.json\"\n").unwrap();

    let config = load_config(Some(ws.path()), Some(&explicit)).unwrap();
    assert_eq!(config.data.min_rows, 5);
    assert_eq!(config.paths.model, PathBuf::from("ci-model.json"));
    assert_eq!(config.paths.data, PathBuf::from("data.csv"));
}

#[test]
fn test_invalid_values_are_rejected() {
    let ws = tempfile::tempdir().unwrap();
    let explicit = ws.path().join("bad.toml");
    std::fs::write(&explicit, "[tracking]\nmax_results = 0\n").unwrap();

    let err = load_config(Some(ws.path()), Some(&explicit)).unwrap_err();
    assert!(err.to_string().contains("tracking.max_results"), "{err}");
}

#[test]
fn test_local_loader_skips_tracking_validation() {
    let ws = tempfile::tempdir().unwrap();
    let explicit = ws.path().join("ci.toml");
    std::fs::write(
        &explicit,
        "[tracking]\nmax_results = 0\n\n[paths]\nmetrics_txt = \"out/metrics.txt\"\n",
    )
    .unwrap();

    assert!(load_config(Some(ws.path()), Some(&explicit)).is_err());
    let config = load_local_config(Some(ws.path()), Some(&explicit)).unwrap();
    assert_eq!(config.paths.metrics_txt, PathBuf::from("out/metrics.txt"));
}
