//! Train candidate estimators, log each as a tracked run and register it.

use crate::data::Dataset;
use crate::error::MlError;
use crate::training::estimator::{Estimator, RegressionModel};
use crate::tracking::{RunStatus, TrackingClient};
use std::path::{Path, PathBuf};

/// Metric logged on every candidate run.
pub const SCORE_METRIC: &str = "r2_score";
/// Artifact path of the model below a run's artifact root.
pub const MODEL_ARTIFACT_DIR: &str = "model";
pub const MODEL_ARTIFACT_FILE: &str = "model.json";

/// Linear, Ridge(α=0.5), Lasso(α=0.1).
pub fn default_candidates() -> Vec<Estimator> {
    vec![
        Estimator::Linear,
        Estimator::Ridge { alpha: 0.5 },
        Estimator::Lasso { alpha: 0.1 },
    ]
}

/// Where and under which names candidates are recorded.
#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub experiment_name: String,
    pub model_name: String,
    pub fit_intercept: bool,
    /// Directory receiving `<Name>.json` copies of each fitted model.
    pub local_dir: PathBuf,
}

/// One logged and registered candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredCandidate {
    pub name: String,
    pub run_id: String,
    pub r2: f64,
    pub version: String,
}

impl RegisteredCandidate {
    pub fn summary(&self) -> String {
        format!(
            "Logged {} | run_id={} | r2={:.4}",
            self.name, self.run_id, self.r2
        )
    }
}

async fn ensure_experiment(
    client: &dyn TrackingClient,
    name: &str,
) -> Result<String, MlError> {
    match client.get_experiment_by_name(name).await? {
        Some(experiment) => Ok(experiment.experiment_id),
        None => Ok(client.create_experiment(name).await?),
    }
}

/// Fit every candidate on the full dataset and record it.
///
/// Candidates are processed in order; the first failure stops the batch
/// after marking the current run `FAILED`.
pub async fn train_and_register(
    client: &dyn TrackingClient,
    dataset: &Dataset,
    candidates: &[Estimator],
    request: &RegisterRequest,
) -> Result<Vec<RegisteredCandidate>, MlError> {
    let experiment_id = ensure_experiment(client, &request.experiment_name).await?;
    client.create_registered_model(&request.model_name).await?;
    std::fs::create_dir_all(&request.local_dir)?;

    let mut registered = Vec::with_capacity(candidates.len());
    for estimator in candidates {
        let model = estimator.fit(
            &dataset.feature_name,
            &dataset.feature,
            &dataset.target,
            request.fit_intercept,
        )?;
        let r2 = model.score(&dataset.feature, &dataset.target)?;

        let run = client
            .create_run(&experiment_id, estimator.name())
            .await?;
        let outcome = record_candidate(
            client,
            &run.run_id,
            run.artifact_uri.as_deref(),
            &model,
            r2,
            request,
        )
        .await;

        match outcome {
            Ok(version) => {
                client.finish_run(&run.run_id, RunStatus::Finished).await?;
                let candidate = RegisteredCandidate {
                    name: estimator.name().to_string(),
                    run_id: run.run_id,
                    r2,
                    version,
                };
                tracing::info!(
                    estimator = %candidate.name,
                    run_id = %candidate.run_id,
                    version = %candidate.version,
                    r2,
                    "registered candidate"
                );
                registered.push(candidate);
            }
            Err(e) => {
                if let Err(finish_err) = client.finish_run(&run.run_id, RunStatus::Failed).await {
                    tracing::warn!(run_id = %run.run_id, error = %finish_err, "could not mark run failed");
                }
                return Err(e);
            }
        }
    }
    Ok(registered)
}

async fn record_candidate(
    client: &dyn TrackingClient,
    run_id: &str,
    artifact_uri: Option<&str>,
    model: &RegressionModel,
    r2: f64,
    request: &RegisterRequest,
) -> Result<String, MlError> {
    let estimator = model.estimator;
    client
        .log_param(run_id, "model_type", estimator.name())
        .await?;
    client
        .log_param(run_id, "fit_intercept", &model.fit_intercept.to_string())
        .await?;
    let alpha = estimator
        .alpha()
        .map_or_else(|| "None".to_string(), |a| a.to_string());
    client.log_param(run_id, "alpha", &alpha).await?;
    client.log_metric(run_id, SCORE_METRIC, r2).await?;
    client
        .set_run_tag(run_id, "mlflow.runName", estimator.name())
        .await?;

    model.save(&local_artifact_path(&request.local_dir, estimator))?;

    let artifact_uri = artifact_uri
        .ok_or_else(|| MlError::registry(format!("run {run_id} has no artifact URI")))?;
    client
        .upload_artifact(
            artifact_uri,
            &format!("{MODEL_ARTIFACT_DIR}/{MODEL_ARTIFACT_FILE}"),
            model.to_json_bytes()?,
        )
        .await?;

    let source = format!(
        "{}/{MODEL_ARTIFACT_DIR}",
        artifact_uri.trim_end_matches('/')
    );
    let version = client
        .create_model_version(&request.model_name, &source, run_id)
        .await?;
    Ok(version.version)
}

fn local_artifact_path(dir: &Path, estimator: Estimator) -> PathBuf {
    dir.join(format!("{}.json", estimator.name()))
}
