//! Pick the best run of an experiment and promote its registered version.
//!
//! Runs are fetched without a server-side filter or ordering and ranked
//! locally, since some servers reject `IS NOT NULL` filter syntax.

use super::PROMOTION_NOTE_TAG;
use crate::error::MlError;
use crate::tracking::{ModelVersion, Run, TrackingClient, TrackingError};
use modelops_core::ModelOpsConfig;

#[derive(Debug, Clone)]
pub struct PromoteRequest {
    pub experiment_name: String,
    pub model_name: String,
    pub metric: String,
    pub alias: String,
    /// Legacy stage used when aliases are unsupported.
    pub stage: String,
    pub allow_stage_fallback: bool,
    pub max_results: usize,
}

impl PromoteRequest {
    pub fn from_config(config: &ModelOpsConfig) -> Self {
        Self {
            experiment_name: config.registry.experiment_name.clone(),
            model_name: config.registry.model_name.clone(),
            metric: config.registry.promote_metric.clone(),
            alias: config.registry.promote_alias.clone(),
            stage: config.registry.stage.clone(),
            allow_stage_fallback: config.registry.allow_stage_fallback,
            max_results: config.tracking.max_results,
        }
    }
}

/// How the chosen version was promoted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromotionOutcome {
    Alias { version: String, alias: String },
    Stage { version: String, stage: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromotionReport {
    pub model_name: String,
    pub run_id: String,
    pub metric_value: f64,
    pub outcome: PromotionOutcome,
}

impl PromotionReport {
    pub fn summary(&self) -> String {
        match &self.outcome {
            PromotionOutcome::Alias { version, alias } => format!(
                "[OK] Alias '{alias}' -> {} v{version} (r2={:.4}).",
                self.model_name, self.metric_value
            ),
            PromotionOutcome::Stage { version, stage } => format!(
                "[OK] Promoted {} v{version} to {stage} (r2={:.4}).",
                self.model_name, self.metric_value
            ),
        }
    }
}

/// The run with the highest value of `metric`.
///
/// Runs without the metric are ignored; NaN values count as null. Ties keep
/// the order the server returned.
pub fn select_best_run<'a>(runs: &'a [Run], metric: &str) -> Result<(&'a Run, f64), MlError> {
    let carriers: Vec<(&Run, f64)> = runs
        .iter()
        .filter_map(|run| run.metric(metric).map(|value| (run, value)))
        .collect();
    if carriers.is_empty() {
        return Err(MlError::registry(format!(
            "No runs with metric '{metric}' found."
        )));
    }
    let mut scored: Vec<(&Run, f64)> = carriers
        .into_iter()
        .filter(|(_, value)| !value.is_nan())
        .collect();
    if scored.is_empty() {
        return Err(MlError::registry(format!("All runs have null '{metric}'.")));
    }
    // stable, so equal scores keep server order
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    Ok(scored[0])
}

fn curl_hint(uri: &str, experiment_name: &str) -> String {
    format!(
        "curl -i {}/api/2.0/mlflow/experiments/get-by-name --get --data-urlencode 'experiment_name={experiment_name}'",
        uri.trim_end_matches('/')
    )
}

fn version_for_run<'a>(versions: &'a [ModelVersion], run_id: &str) -> Option<&'a ModelVersion> {
    versions
        .iter()
        .filter(|v| v.run_id.as_deref() == Some(run_id))
        .max_by_key(|v| v.number())
}

/// Find the best run and point the alias at its registered version,
/// falling back to a legacy stage transition when allowed.
pub async fn promote_best(
    client: &dyn TrackingClient,
    request: &PromoteRequest,
) -> Result<PromotionReport, MlError> {
    let uri = client.tracking_uri().to_string();
    if let Err(e) = client.probe(&request.experiment_name).await {
        tracing::debug!(error = %e, "reachability probe failed");
        return Err(MlError::Unreachable {
            hint: curl_hint(&uri, &request.experiment_name),
            uri,
        });
    }

    let experiment = client
        .get_experiment_by_name(&request.experiment_name)
        .await?
        .ok_or_else(|| {
            MlError::registry(format!(
                "Experiment '{}' not found at {uri}",
                request.experiment_name
            ))
        })?;

    let runs = client
        .search_runs(
            std::slice::from_ref(&experiment.experiment_id),
            request.max_results,
        )
        .await?;
    let (best, value) = select_best_run(&runs, &request.metric)?;
    let run_id = best.run_id().to_string();
    tracing::info!(run_id = %run_id, metric = %request.metric, value, runs = runs.len(), "best run selected");

    let versions = client.search_model_versions(&request.model_name).await?;
    let version = version_for_run(&versions, &run_id)
        .map(|v| v.version.clone())
        .ok_or_else(|| {
            MlError::registry(format!(
                "No registered version under '{}' for run_id {run_id}.",
                request.model_name
            ))
        })?;

    let outcome = match promote_via_alias(client, request, &version, value).await {
        Ok(outcome) => outcome,
        Err(e) if request.allow_stage_fallback && e.suggests_missing_alias_support() => {
            tracing::warn!(error = %e, stage = %request.stage, "aliases unsupported; falling back to stage");
            promote_via_stage(client, request, &version, value).await?
        }
        Err(e) => return Err(e.into()),
    };

    Ok(PromotionReport {
        model_name: request.model_name.clone(),
        run_id,
        metric_value: value,
        outcome,
    })
}

async fn promote_via_alias(
    client: &dyn TrackingClient,
    request: &PromoteRequest,
    version: &str,
    value: f64,
) -> Result<PromotionOutcome, TrackingError> {
    let name = &request.model_name;
    client
        .set_registered_model_alias(name, &request.alias, version)
        .await?;
    let note = format!(
        "Auto-promoted via alias '{}' ({}={value:.4})",
        request.alias, request.metric
    );
    client
        .set_model_version_tag(name, version, PROMOTION_NOTE_TAG, &note)
        .await?;

    let reported = match client.get_model_version_by_alias(name, &request.alias).await {
        Ok(aliased) => aliased.version,
        Err(e) => {
            tracing::debug!(error = %e, "alias read-back failed");
            version.to_string()
        }
    };
    Ok(PromotionOutcome::Alias {
        version: reported,
        alias: request.alias.clone(),
    })
}

async fn promote_via_stage(
    client: &dyn TrackingClient,
    request: &PromoteRequest,
    version: &str,
    value: f64,
) -> Result<PromotionOutcome, TrackingError> {
    let name = &request.model_name;
    client
        .transition_model_version_stage(name, version, &request.stage, true)
        .await?;
    let note = format!(
        "Promoted to {} ({}={value:.4})",
        request.stage, request.metric
    );
    client
        .set_model_version_tag(name, version, PROMOTION_NOTE_TAG, &note)
        .await?;
    Ok(PromotionOutcome::Stage {
        version: version.to_string(),
        stage: request.stage.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::{Metric, RunData, RunInfo};
    use pretty_assertions::assert_eq;

    fn run(id: &str, metric: Option<f64>) -> Run {
        Run {
            info: RunInfo {
                run_id: id.to_string(),
                experiment_id: "1".to_string(),
                run_name: None,
                status: None,
                start_time: None,
                end_time: None,
                artifact_uri: None,
            },
            data: RunData {
                metrics: metric
                    .map(|value| Metric {
                        key: "r2_score".to_string(),
                        value,
                        timestamp: 0,
                        step: 0,
                    })
                    .into_iter()
                    .collect(),
                ..RunData::default()
            },
        }
    }

    #[test]
    fn test_best_run_ignores_missing_metric() {
        let runs = vec![run("a", None), run("b", Some(0.7)), run("c", Some(0.9))];
        let (best, value) = select_best_run(&runs, "r2_score").unwrap();
        assert_eq!(best.run_id(), "c");
        assert_eq!(value, 0.9);
    }

    #[test]
    fn test_ties_keep_server_order() {
        let runs = vec![run("first", Some(0.8)), run("second", Some(0.8))];
        let (best, _) = select_best_run(&runs, "r2_score").unwrap();
        assert_eq!(best.run_id(), "first");
    }

    #[test]
    fn test_no_carriers_and_all_null() {
        let err = select_best_run(&[run("a", None)], "r2_score").unwrap_err();
        assert_eq!(err.to_string(), "Registry error: No runs with metric 'r2_score' found.");

        let err = select_best_run(&[run("a", Some(f64::NAN))], "r2_score").unwrap_err();
        assert_eq!(err.to_string(), "Registry error: All runs have null 'r2_score'.");
    }

    #[test]
    fn test_nan_does_not_beat_real_scores() {
        let runs = vec![run("nan", Some(f64::NAN)), run("real", Some(-0.5))];
        assert_eq!(select_best_run(&runs, "r2_score").unwrap().0.run_id(), "real");
    }

    #[test]
    fn test_summary_lines() {
        let mut report = PromotionReport {
            model_name: "simple-regressor".into(),
            run_id: "abc".into(),
            metric_value: 0.91234,
            outcome: PromotionOutcome::Alias {
                version: "3".into(),
                alias: "staging".into(),
            },
        };
        assert_eq!(
            report.summary(),
            "[OK] Alias 'staging' -> simple-regressor v3 (r2=0.9123)."
        );
        report.outcome = PromotionOutcome::Stage {
            version: "3".into(),
            stage: "Staging".into(),
        };
        assert_eq!(
            report.summary(),
            "[OK] Promoted simple-regressor v3 to Staging (r2=0.9123)."
        );
    }

    #[test]
    fn test_curl_hint() {
        assert_eq!(
            curl_hint("http://127.0.0.1:5000/", "exp"),
            "curl -i http://127.0.0.1:5000/api/2.0/mlflow/experiments/get-by-name --get --data-urlencode 'experiment_name=exp'"
        );
    }
}
