//! In-process tracking server stand-in.
//!
//! Mirrors the MLflow semantics the pipeline relies on: experiments, runs,
//! registered models with numbered versions, aliases that move between
//! versions, legacy stages with archiving, and a proxied artifact store.
//! Errors carry the same codes a real server would return.

use super::artifacts::ArtifactLocation;
use super::types::{Experiment, KeyValue, Metric, ModelVersion, Run, RunData, RunInfo, RunStatus};
use super::{ENDPOINT_NOT_FOUND, RESOURCE_ALREADY_EXISTS, TrackingClient, TrackingError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct State {
    experiments: Vec<Experiment>,
    runs: Vec<Run>,
    registered_models: Vec<String>,
    versions: Vec<ModelVersion>,
    /// (model, alias) -> version
    aliases: HashMap<(String, String), String>,
    artifacts: HashMap<ArtifactLocation, Vec<u8>>,
}

impl State {
    fn run_mut(&mut self, run_id: &str) -> Result<&mut Run, TrackingError> {
        self.runs
            .iter_mut()
            .find(|r| r.info.run_id == run_id)
            .ok_or_else(|| TrackingError::not_found(format!("Run '{run_id}' not found")))
    }

    fn version_index(&self, name: &str, version: &str) -> Result<usize, TrackingError> {
        self.versions
            .iter()
            .position(|v| v.name == name && v.version == version)
            .ok_or_else(|| {
                TrackingError::not_found(format!(
                    "Model Version (name={name}, version={version}) not found"
                ))
            })
    }

    /// A copy of the version with its current aliases filled in.
    fn snapshot(&self, index: usize) -> ModelVersion {
        let mut version = self.versions[index].clone();
        let mut aliases: Vec<String> = self
            .aliases
            .iter()
            .filter(|((model, _), v)| *model == version.name && **v == version.version)
            .map(|((_, alias), _)| alias.clone())
            .collect();
        aliases.sort();
        version.aliases = aliases;
        version
    }

    fn ensure_experiment(&mut self, name: &str) -> String {
        if let Some(exp) = self.experiments.iter().find(|e| e.name == name) {
            return exp.experiment_id.clone();
        }
        let id = (self.experiments.len() + 1).to_string();
        self.experiments.push(Experiment {
            experiment_id: id.clone(),
            name: name.to_string(),
            artifact_location: Some(format!("mlflow-artifacts:/{id}")),
            lifecycle_stage: Some("active".to_string()),
        });
        id
    }

    fn insert_run(&mut self, experiment_id: &str, run_name: &str) -> RunInfo {
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let info = RunInfo {
            artifact_uri: Some(format!("mlflow-artifacts:/{experiment_id}/{run_id}/artifacts")),
            run_id,
            experiment_id: experiment_id.to_string(),
            run_name: Some(run_name.to_string()),
            status: Some("RUNNING".to_string()),
            start_time: Some(chrono::Utc::now().timestamp_millis()),
            end_time: None,
        };
        self.runs.push(Run {
            info: info.clone(),
            data: RunData {
                tags: vec![KeyValue::new("mlflow.runName", run_name)],
                ..RunData::default()
            },
        });
        info
    }
}

/// A [`TrackingClient`] that keeps everything in memory.
pub struct InMemoryTracking {
    uri: String,
    state: Mutex<State>,
    alias_support: bool,
    /// (status, code, message) returned by every alias write
    alias_write_failure: Option<(u16, String, String)>,
    reachable: bool,
}

impl Default for InMemoryTracking {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTracking {
    pub fn new() -> Self {
        Self {
            uri: "memory://tracking".to_string(),
            state: Mutex::new(State::default()),
            alias_support: true,
            alias_write_failure: None,
            reachable: true,
        }
    }

    /// Behave like a server that predates registered-model aliases.
    pub fn without_alias_support(mut self) -> Self {
        self.alias_support = false;
        self
    }

    /// Reject alias writes with an API error unrelated to alias support,
    /// such as a bad parameter or an internal server error.
    pub fn rejecting_alias_writes(
        mut self,
        status: u16,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.alias_write_failure = Some((status, code.into(), message.into()));
        self
    }

    /// Fail every call as if the server could not be reached.
    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_reachable(&self) -> Result<(), TrackingError> {
        if self.reachable {
            Ok(())
        } else {
            Err(TrackingError::Unreachable {
                uri: self.uri.clone(),
                reason: "connection refused".to_string(),
            })
        }
    }

    fn check_alias_support(&self) -> Result<(), TrackingError> {
        if self.alias_support {
            Ok(())
        } else {
            Err(TrackingError::api(
                404,
                ENDPOINT_NOT_FOUND,
                "No API endpoint found for registered-models/alias",
            ))
        }
    }

    /// Record a finished run with the given metrics, creating the experiment
    /// if needed. Returns the run id.
    pub fn add_run(&self, experiment: &str, run_name: &str, metrics: &[(&str, f64)]) -> String {
        let mut state = self.state();
        let experiment_id = state.ensure_experiment(experiment);
        let info = state.insert_run(&experiment_id, run_name);
        let timestamp = info.start_time.unwrap_or_default();
        if let Some(run) = state.runs.last_mut() {
            run.info.status = Some(RunStatus::Finished.as_str().to_string());
            run.data.metrics = metrics
                .iter()
                .map(|(key, value)| Metric {
                    key: key.to_string(),
                    value: *value,
                    timestamp,
                    step: 0,
                })
                .collect();
        }
        info.run_id
    }

    /// Register a version of `model` for `run_id` and return its number.
    pub fn add_version(&self, model: &str, run_id: &str) -> String {
        let mut state = self.state();
        if !state.registered_models.iter().any(|m| m == model) {
            state.registered_models.push(model.to_string());
        }
        let source = state
            .runs
            .iter()
            .find(|r| r.info.run_id == run_id)
            .and_then(|r| r.info.artifact_uri.clone())
            .map(|uri| format!("{uri}/model"))
            .unwrap_or_default();
        push_version(&mut state, model, &source, run_id).version
    }

    pub fn artifact(&self, uri: &str, relative_path: &str) -> Option<Vec<u8>> {
        let location = ArtifactLocation::parse(uri).ok()?.join(relative_path);
        self.state().artifacts.get(&location).cloned()
    }

    pub fn alias_target(&self, model: &str, alias: &str) -> Option<String> {
        self.state()
            .aliases
            .get(&(model.to_string(), alias.to_string()))
            .cloned()
    }

    pub fn stage_of(&self, model: &str, version: &str) -> Option<String> {
        self.state()
            .versions
            .iter()
            .find(|v| v.name == model && v.version == version)
            .and_then(|v| v.current_stage.clone())
    }

    pub fn version_tags(&self, model: &str, version: &str) -> Vec<KeyValue> {
        self.state()
            .versions
            .iter()
            .find(|v| v.name == model && v.version == version)
            .map(|v| v.tags.clone())
            .unwrap_or_default()
    }

    pub fn runs(&self) -> Vec<Run> {
        self.state().runs.clone()
    }
}

fn push_version(state: &mut State, name: &str, source: &str, run_id: &str) -> ModelVersion {
    let next = state
        .versions
        .iter()
        .filter(|v| v.name == name)
        .map(ModelVersion::number)
        .max()
        .unwrap_or(0)
        + 1;
    let version = ModelVersion {
        name: name.to_string(),
        version: next.to_string(),
        run_id: Some(run_id.to_string()),
        source: Some(source.to_string()),
        current_stage: Some("None".to_string()),
        status: Some("READY".to_string()),
        aliases: Vec::new(),
        tags: Vec::new(),
    };
    state.versions.push(version.clone());
    version
}

#[async_trait]
impl TrackingClient for InMemoryTracking {
    fn tracking_uri(&self) -> &str {
        &self.uri
    }

    async fn probe(&self, _experiment_name: &str) -> Result<(), TrackingError> {
        self.check_reachable()
    }

    async fn get_experiment_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Experiment>, TrackingError> {
        self.check_reachable()?;
        Ok(self
            .state()
            .experiments
            .iter()
            .find(|e| e.name == name)
            .cloned())
    }

    async fn create_experiment(&self, name: &str) -> Result<String, TrackingError> {
        self.check_reachable()?;
        let mut state = self.state();
        if state.experiments.iter().any(|e| e.name == name) {
            return Err(TrackingError::api(
                400,
                RESOURCE_ALREADY_EXISTS,
                format!("Experiment '{name}' already exists."),
            ));
        }
        Ok(state.ensure_experiment(name))
    }

    async fn search_runs(
        &self,
        experiment_ids: &[String],
        max_results: usize,
    ) -> Result<Vec<Run>, TrackingError> {
        self.check_reachable()?;
        Ok(self
            .state()
            .runs
            .iter()
            .filter(|r| experiment_ids.contains(&r.info.experiment_id))
            .take(max_results)
            .cloned()
            .collect())
    }

    async fn create_run(
        &self,
        experiment_id: &str,
        run_name: &str,
    ) -> Result<RunInfo, TrackingError> {
        self.check_reachable()?;
        let mut state = self.state();
        if !state
            .experiments
            .iter()
            .any(|e| e.experiment_id == experiment_id)
        {
            return Err(TrackingError::not_found(format!(
                "No Experiment with id={experiment_id} exists"
            )));
        }
        Ok(state.insert_run(experiment_id, run_name))
    }

    async fn log_metric(&self, run_id: &str, key: &str, value: f64) -> Result<(), TrackingError> {
        self.check_reachable()?;
        let mut state = self.state();
        let run = state.run_mut(run_id)?;
        run.data.metrics.push(Metric {
            key: key.to_string(),
            value,
            timestamp: chrono::Utc::now().timestamp_millis(),
            step: 0,
        });
        Ok(())
    }

    async fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<(), TrackingError> {
        self.check_reachable()?;
        let mut state = self.state();
        let run = state.run_mut(run_id)?;
        if let Some(existing) = run.data.params.iter().find(|p| p.key == key) {
            if existing.value != value {
                return Err(TrackingError::api(
                    400,
                    "INVALID_PARAMETER_VALUE",
                    format!("Changing param values is not allowed. Param with key='{key}' was already logged"),
                ));
            }
            return Ok(());
        }
        run.data.params.push(KeyValue::new(key, value));
        Ok(())
    }

    async fn set_run_tag(
        &self,
        run_id: &str,
        key: &str,
        value: &str,
    ) -> Result<(), TrackingError> {
        self.check_reachable()?;
        let mut state = self.state();
        let run = state.run_mut(run_id)?;
        run.data.tags.retain(|t| t.key != key);
        run.data.tags.push(KeyValue::new(key, value));
        Ok(())
    }

    async fn finish_run(&self, run_id: &str, status: RunStatus) -> Result<(), TrackingError> {
        self.check_reachable()?;
        let mut state = self.state();
        let run = state.run_mut(run_id)?;
        run.info.status = Some(status.as_str().to_string());
        run.info.end_time = Some(chrono::Utc::now().timestamp_millis());
        Ok(())
    }

    async fn upload_artifact(
        &self,
        artifact_uri: &str,
        relative_path: &str,
        bytes: Vec<u8>,
    ) -> Result<(), TrackingError> {
        self.check_reachable()?;
        let location = ArtifactLocation::parse(artifact_uri)?.join(relative_path);
        self.state().artifacts.insert(location, bytes);
        Ok(())
    }

    async fn download_artifact(
        &self,
        artifact_uri: &str,
        relative_path: &str,
    ) -> Result<Vec<u8>, TrackingError> {
        self.check_reachable()?;
        let location = ArtifactLocation::parse(artifact_uri)?.join(relative_path);
        self.state()
            .artifacts
            .get(&location)
            .cloned()
            .ok_or_else(|| {
                TrackingError::not_found(format!("artifact {artifact_uri}/{relative_path} not found"))
            })
    }

    async fn create_registered_model(&self, name: &str) -> Result<(), TrackingError> {
        self.check_reachable()?;
        let mut state = self.state();
        if !state.registered_models.iter().any(|m| m == name) {
            state.registered_models.push(name.to_string());
        }
        Ok(())
    }

    async fn create_model_version(
        &self,
        name: &str,
        source: &str,
        run_id: &str,
    ) -> Result<ModelVersion, TrackingError> {
        self.check_reachable()?;
        let mut state = self.state();
        if !state.registered_models.iter().any(|m| m == name) {
            return Err(TrackingError::not_found(format!(
                "Registered Model with name={name} not found"
            )));
        }
        Ok(push_version(&mut state, name, source, run_id))
    }

    async fn search_model_versions(&self, name: &str) -> Result<Vec<ModelVersion>, TrackingError> {
        self.check_reachable()?;
        let state = self.state();
        Ok((0..state.versions.len())
            .filter(|&i| state.versions[i].name == name)
            .map(|i| state.snapshot(i))
            .collect())
    }

    async fn set_registered_model_alias(
        &self,
        name: &str,
        alias: &str,
        version: &str,
    ) -> Result<(), TrackingError> {
        self.check_reachable()?;
        self.check_alias_support()?;
        if let Some((status, code, message)) = &self.alias_write_failure {
            return Err(TrackingError::api(*status, code.clone(), message.clone()));
        }
        let mut state = self.state();
        state.version_index(name, version)?;
        state
            .aliases
            .insert((name.to_string(), alias.to_string()), version.to_string());
        Ok(())
    }

    async fn get_model_version_by_alias(
        &self,
        name: &str,
        alias: &str,
    ) -> Result<ModelVersion, TrackingError> {
        self.check_reachable()?;
        self.check_alias_support()?;
        let state = self.state();
        let version = state
            .aliases
            .get(&(name.to_string(), alias.to_string()))
            .cloned()
            .ok_or_else(|| {
                TrackingError::not_found(format!(
                    "Registered model alias {alias} not found for model {name}"
                ))
            })?;
        let index = state.version_index(name, &version)?;
        Ok(state.snapshot(index))
    }

    async fn set_model_version_tag(
        &self,
        name: &str,
        version: &str,
        key: &str,
        value: &str,
    ) -> Result<(), TrackingError> {
        self.check_reachable()?;
        let mut state = self.state();
        let index = state.version_index(name, version)?;
        let tags = &mut state.versions[index].tags;
        tags.retain(|t| t.key != key);
        tags.push(KeyValue::new(key, value));
        Ok(())
    }

    async fn transition_model_version_stage(
        &self,
        name: &str,
        version: &str,
        stage: &str,
        archive_existing: bool,
    ) -> Result<ModelVersion, TrackingError> {
        self.check_reachable()?;
        let mut state = self.state();
        let index = state.version_index(name, version)?;
        if archive_existing {
            for other in state
                .versions
                .iter_mut()
                .filter(|v| v.name == name && v.version != version && v.in_stage(stage))
            {
                other.current_stage = Some("Archived".to_string());
            }
        }
        state.versions[index].current_stage = Some(stage.to_string());
        Ok(state.snapshot(index))
    }

    async fn get_model_version_download_uri(
        &self,
        name: &str,
        version: &str,
    ) -> Result<String, TrackingError> {
        self.check_reachable()?;
        let state = self.state();
        let index = state.version_index(name, version)?;
        state.versions[index].source.clone().ok_or_else(|| {
            TrackingError::not_found(format!("Model Version {name}/{version} has no source"))
        })
    }
}
