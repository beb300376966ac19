//! Configuration system for modelops.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> `MODELOPS_` environment -> legacy environment
//! names -> CLI overrides. Files are read from `~/.config/modelops/config.toml`
//! and `.modelops/config.toml` in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, CoreError};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelOpsConfig {
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub data: DataContractConfig,
}

/// Connection settings for the tracking server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Base URI of the MLflow-compatible server.
    #[serde(default = "default_tracking_uri")]
    pub uri: String,
    /// Per-request timeout. Requests are never retried.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: f64,
    /// Ignore HTTP(S)_PROXY settings entirely.
    #[serde(default = "default_true")]
    pub disable_proxies: bool,
    /// Upper bound on runs fetched when searching an experiment.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            uri: default_tracking_uri(),
            http_timeout_secs: default_http_timeout(),
            disable_proxies: true,
            max_results: default_max_results(),
        }
    }
}

fn default_tracking_uri() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_http_timeout() -> f64 {
    15.0
}

fn default_max_results() -> usize {
    1000
}

/// Names used against the experiment tracker and model registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_experiment_name")]
    pub experiment_name: String,
    #[serde(default = "default_model_name")]
    pub model_name: String,
    /// Alias assigned by `promote`.
    #[serde(default = "default_alias")]
    pub promote_alias: String,
    /// Alias tried first by `predict`.
    #[serde(default = "default_alias")]
    pub load_alias: String,
    /// Legacy stage used as a fallback in both directions.
    #[serde(default = "default_stage")]
    pub stage: String,
    #[serde(default)]
    pub allow_stage_fallback: bool,
    /// Run metric that ranks candidates for promotion.
    #[serde(default = "default_promote_metric")]
    pub promote_metric: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            experiment_name: default_experiment_name(),
            model_name: default_model_name(),
            promote_alias: default_alias(),
            load_alias: default_alias(),
            stage: default_stage(),
            allow_stage_fallback: false,
            promote_metric: default_promote_metric(),
        }
    }
}

fn default_experiment_name() -> String {
    "simple-regression".to_string()
}

fn default_model_name() -> String {
    "simple-regressor".to_string()
}

fn default_alias() -> String {
    "staging".to_string()
}

fn default_stage() -> String {
    "Staging".to_string()
}

fn default_promote_metric() -> String {
    "r2_score".to_string()
}

/// Local file locations shared by the pipeline steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_data_path")]
    pub data: PathBuf,
    #[serde(default = "default_params_path")]
    pub params: PathBuf,
    #[serde(default = "default_model_path")]
    pub model: PathBuf,
    #[serde(default = "default_metrics_json")]
    pub metrics_json: PathBuf,
    #[serde(default = "default_metrics_txt")]
    pub metrics_txt: PathBuf,
    #[serde(default = "default_threshold_path")]
    pub threshold: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data: default_data_path(),
            params: default_params_path(),
            model: default_model_path(),
            metrics_json: default_metrics_json(),
            metrics_txt: default_metrics_txt(),
            threshold: default_threshold_path(),
        }
    }
}

fn default_data_path() -> PathBuf {
    PathBuf::from("data.csv")
}

fn default_params_path() -> PathBuf {
    PathBuf::from("params.yaml")
}

fn default_model_path() -> PathBuf {
    PathBuf::from("model.json")
}

fn default_metrics_json() -> PathBuf {
    PathBuf::from("metrics.json")
}

fn default_metrics_txt() -> PathBuf {
    PathBuf::from("metrics.txt")
}

fn default_threshold_path() -> PathBuf {
    PathBuf::from("expected_min_r2.txt")
}

/// Shape the training CSV must have.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataContractConfig {
    #[serde(default = "default_feature_column")]
    pub feature_column: String,
    #[serde(default = "default_target_column")]
    pub target_column: String,
    #[serde(default = "default_min_rows")]
    pub min_rows: usize,
}

impl Default for DataContractConfig {
    fn default() -> Self {
        Self {
            feature_column: default_feature_column(),
            target_column: default_target_column(),
            min_rows: default_min_rows(),
        }
    }
}

fn default_feature_column() -> String {
    "feature".to_string()
}

fn default_target_column() -> String {
    "target".to_string()
}

fn default_min_rows() -> usize {
    3
}

fn default_true() -> bool {
    true
}

impl ModelOpsConfig {
    /// Reject values that deserialize fine but cannot work at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let uri = url::Url::parse(&self.tracking.uri)
            .map_err(|e| ConfigError::invalid("tracking.uri", e.to_string()))?;
        if !matches!(uri.scheme(), "http" | "https") {
            return Err(ConfigError::invalid(
                "tracking.uri",
                format!("unsupported scheme '{}'", uri.scheme()),
            ));
        }
        if uri.host_str().is_none_or(str::is_empty) {
            return Err(ConfigError::invalid("tracking.uri", "missing host"));
        }
        if !(self.tracking.http_timeout_secs.is_finite() && self.tracking.http_timeout_secs > 0.0)
        {
            return Err(ConfigError::invalid(
                "tracking.http_timeout_secs",
                "must be a positive number of seconds",
            ));
        }
        if !(1..=50_000).contains(&self.tracking.max_results) {
            return Err(ConfigError::invalid(
                "tracking.max_results",
                "must be between 1 and 50000",
            ));
        }

        let names = [
            ("registry.experiment_name", &self.registry.experiment_name),
            ("registry.model_name", &self.registry.model_name),
            ("registry.promote_alias", &self.registry.promote_alias),
            ("registry.load_alias", &self.registry.load_alias),
            ("registry.stage", &self.registry.stage),
            ("registry.promote_metric", &self.registry.promote_metric),
        ];
        for (field, value) in names {
            if value.trim().is_empty() {
                return Err(ConfigError::invalid(field, "must not be empty"));
            }
        }
        self.validate_local()
    }

    /// Checks for the settings the offline steps read: paths and the data contract.
    pub fn validate_local(&self) -> Result<(), ConfigError> {
        let names = [
            ("data.feature_column", &self.data.feature_column),
            ("data.target_column", &self.data.target_column),
        ];
        for (field, value) in names {
            if value.trim().is_empty() {
                return Err(ConfigError::invalid(field, "must not be empty"));
            }
        }
        Ok(())
    }
}

/// Directory holding the user-level config file and log files.
pub fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "modelops", "modelops")
}

/// Path of the workspace-level config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".modelops").join("config.toml")
}

/// Write the default configuration to `.modelops/config.toml` in `workspace`.
///
/// Returns `Ok(None)` when a config file already exists there.
pub fn write_default_config(workspace: &Path) -> Result<Option<PathBuf>, CoreError> {
    let path = workspace_config_path(workspace);
    if path.exists() {
        return Ok(None);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(&ModelOpsConfig::default())?;
    std::fs::write(&path, toml_str)?;
    Ok(Some(path))
}

/// Load configuration with layered merging, then apply legacy environment
/// names and validate.
pub fn load_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
) -> Result<ModelOpsConfig, ConfigError> {
    let mut config: ModelOpsConfig = layered(workspace, config_file)
        .extract()
        .map_err(Box::new)?;
    apply_legacy_env(&mut config, |var| std::env::var(var).ok())?;
    config.validate()?;
    Ok(config)
}

/// Load configuration for steps that never contact the tracking server.
///
/// Legacy environment names only carry tracking and registry settings, so
/// they are skipped, and only the local sections are validated. A stray
/// `HTTP_TIMEOUT_SEC` or `MLFLOW_TRACKING_URI` cannot fail these steps.
pub fn load_local_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
) -> Result<ModelOpsConfig, ConfigError> {
    let config: ModelOpsConfig = layered(workspace, config_file)
        .extract()
        .map_err(Box::new)?;
    config.validate_local()?;
    Ok(config)
}

fn layered(workspace: Option<&Path>, config_file: Option<&Path>) -> Figment {
    let mut figment = Figment::from(Serialized::defaults(ModelOpsConfig::default()));

    if let Some(dirs) = project_dirs() {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = config_file {
        figment = figment.merge(Toml::file(path));
    }

    // MODELOPS_TRACKING__URI, MODELOPS_REGISTRY__MODEL_NAME, ...
    figment.merge(Env::prefixed("MODELOPS_").split("__"))
}

/// Environment variable names understood for compatibility with existing
/// CI pipelines, in the order they are applied.
pub const LEGACY_ENV_VARS: &[&str] = &[
    "MLFLOW_TRACKING_URI",
    "EXPERIMENT_NAME",
    "MODEL_NAME",
    "PROMOTE_ALIAS",
    "MODEL_ALIAS",
    "MODEL_STAGE",
    "ALLOW_STAGE_FALLBACK",
    "HTTP_TIMEOUT_SEC",
    "DISABLE_PROXIES",
];

/// Overlay the legacy, unprefixed environment variables.
///
/// `lookup` abstracts the environment so callers and tests can supply values
/// without touching process state.
pub fn apply_legacy_env<F>(config: &mut ModelOpsConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    for var in LEGACY_ENV_VARS {
        let Some(value) = lookup(var) else {
            continue;
        };
        tracing::debug!(var, "applying legacy environment override");
        match *var {
            "MLFLOW_TRACKING_URI" => config.tracking.uri = value,
            "EXPERIMENT_NAME" => config.registry.experiment_name = value,
            "MODEL_NAME" => config.registry.model_name = value,
            "PROMOTE_ALIAS" => config.registry.promote_alias = value,
            "MODEL_ALIAS" => config.registry.load_alias = value,
            "MODEL_STAGE" => config.registry.stage = value,
            "ALLOW_STAGE_FALLBACK" => config.registry.allow_stage_fallback = parse_flag(&value),
            "DISABLE_PROXIES" => config.tracking.disable_proxies = parse_flag(&value),
            "HTTP_TIMEOUT_SEC" => {
                config.tracking.http_timeout_secs =
                    value.trim().parse().map_err(|_| ConfigError::BadEnv {
                        var: var.to_string(),
                        value: value.clone(),
                        reason: "expected a number of seconds".to_string(),
                    })?;
            }
            _ => {}
        }
    }
    Ok(())
}

/// `1`, `true`, `yes` and `on` (any case) enable a flag; anything else disables it.
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ModelOpsConfig::default();
        assert_eq!(config.tracking.uri, "http://127.0.0.1:5000");
        assert_eq!(config.tracking.http_timeout_secs, 15.0);
        assert!(config.tracking.disable_proxies);
        assert_eq!(config.tracking.max_results, 1000);
        assert_eq!(config.registry.promote_alias, "staging");
        assert_eq!(config.registry.stage, "Staging");
        assert!(!config.registry.allow_stage_fallback);
        assert_eq!(config.registry.promote_metric, "r2_score");
        assert_eq!(config.paths.metrics_txt, PathBuf::from("metrics.txt"));
        assert_eq!(config.data.min_rows, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = ModelOpsConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: ModelOpsConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let parsed: ModelOpsConfig = toml::from_str(
            r#"
            [registry]
            model_name = "house-prices"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.registry.model_name, "house-prices");
        assert_eq!(parsed.registry.promote_alias, "staging");
        assert_eq!(parsed.tracking.max_results, 1000);
    }

    #[test]
    fn test_legacy_env_overrides() {
        let mut config = ModelOpsConfig::default();
        apply_legacy_env(
            &mut config,
            env_of(&[
                ("MLFLOW_TRACKING_URI", "http://tracker.internal:8081"),
                ("MODEL_NAME", "w6-simple-regressor"),
                ("PROMOTE_ALIAS", "champion"),
                ("MODEL_ALIAS", "challenger"),
                ("ALLOW_STAGE_FALLBACK", "1"),
                ("HTTP_TIMEOUT_SEC", "2.5"),
                ("DISABLE_PROXIES", "0"),
            ]),
        )
        .unwrap();
        assert_eq!(config.tracking.uri, "http://tracker.internal:8081");
        assert_eq!(config.registry.model_name, "w6-simple-regressor");
        assert_eq!(config.registry.promote_alias, "champion");
        assert_eq!(config.registry.load_alias, "challenger");
        assert!(config.registry.allow_stage_fallback);
        assert_eq!(config.tracking.http_timeout_secs, 2.5);
        assert!(!config.tracking.disable_proxies);
    }

    #[test]
    fn test_legacy_env_rejects_bad_timeout() {
        let mut config = ModelOpsConfig::default();
        let err = apply_legacy_env(&mut config, env_of(&[("HTTP_TIMEOUT_SEC", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::BadEnv { ref var, .. } if var == "HTTP_TIMEOUT_SEC"));
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("1"));
        assert!(parse_flag(" TRUE "));
        assert!(parse_flag("yes"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag(""));
        assert!(!parse_flag("2"));
    }

    #[test]
    fn test_validate_rejects_non_http_uri() {
        let mut config = ModelOpsConfig::default();
        config.tracking.uri = "file:///tmp/mlruns".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("tracking.uri"));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = ModelOpsConfig::default();
        config.tracking.http_timeout_secs = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_local_ignores_tracking() {
        let mut config = ModelOpsConfig::default();
        config.tracking.uri = "not a uri".to_string();
        config.tracking.http_timeout_secs = -1.0;
        assert!(config.validate().is_err());
        assert!(config.validate_local().is_ok());

        config.data.target_column = String::new();
        let err = config.validate_local().unwrap_err();
        assert!(err.to_string().contains("data.target_column"));
    }

    #[test]
    fn test_validate_rejects_empty_model_name() {
        let mut config = ModelOpsConfig::default();
        config.registry.model_name = "  ".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("registry.model_name"));
    }

    #[test]
    fn test_workspace_config_is_merged() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_dir = dir.path().join(".modelops");
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(
            cfg_dir.join("config.toml"),
            "[tracking]\nuri = \"http://10.0.0.7:5000\"\nmax_results = 50\n",
        )
        .unwrap();

        let config: ModelOpsConfig = layered(Some(dir.path()), None).extract().unwrap();
        assert_eq!(config.tracking.uri, "http://10.0.0.7:5000");
        assert_eq!(config.tracking.max_results, 50);
        assert_eq!(config.registry.stage, "Staging");
    }

    #[test]
    fn test_write_default_config_once() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_default_config(dir.path()).unwrap();
        assert_eq!(written, Some(workspace_config_path(dir.path())));
        assert_eq!(write_default_config(dir.path()).unwrap(), None);

        let config: ModelOpsConfig = layered(Some(dir.path()), None).extract().unwrap();
        assert_eq!(config.registry.model_name, "simple-regressor");
    }

    #[test]
    fn test_explicit_file_wins_over_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_dir = dir.path().join(".modelops");
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(
            cfg_dir.join("config.toml"),
            "[registry]\nmodel_name = \"from-workspace\"\n",
        )
        .unwrap();
        let explicit = dir.path().join("ci.toml");
        std::fs::write(&explicit, "[registry]\nmodel_name = \"from-ci\"\n").unwrap();

        let config: ModelOpsConfig = layered(Some(dir.path()), Some(&explicit))
            .extract()
            .unwrap();
        assert_eq!(config.registry.model_name, "from-ci");
    }
}
