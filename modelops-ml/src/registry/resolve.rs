//! Load a registered model by alias, falling back to a legacy stage.

use crate::error::MlError;
use crate::training::estimator::RegressionModel;
use crate::training::register::MODEL_ARTIFACT_FILE;
use crate::tracking::TrackingClient;
use modelops_core::ModelOpsConfig;
use std::fmt;

#[derive(Debug, Clone)]
pub struct ResolveRequest {
    pub model_name: String,
    pub alias: String,
    pub stage: String,
}

impl ResolveRequest {
    pub fn from_config(config: &ModelOpsConfig) -> Self {
        Self {
            model_name: config.registry.model_name.clone(),
            alias: config.registry.load_alias.clone(),
            stage: config.registry.stage.clone(),
        }
    }
}

/// Which reference produced the loaded version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedVia {
    Alias(String),
    Stage(String),
}

impl fmt::Display for ResolvedVia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alias(alias) => write!(f, "alias '@{alias}'"),
            Self::Stage(stage) => write!(f, "stage '{stage}'"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub name: String,
    pub version: String,
    pub via: ResolvedVia,
    pub model: RegressionModel,
}

impl LoadedModel {
    pub fn summary(&self) -> String {
        format!("[OK] Loaded '{}' via {}", self.name, self.via)
    }
}

/// `models:/<name>@<alias>`, else `models:/<name>/<stage>`.
pub async fn load_model(
    client: &dyn TrackingClient,
    request: &ResolveRequest,
) -> Result<LoadedModel, MlError> {
    let name = &request.model_name;
    let alias_error = match load_via_alias(client, name, &request.alias).await {
        Ok(loaded) => return Ok(loaded),
        Err(e) => e,
    };
    tracing::warn!(
        alias = %request.alias,
        stage = %request.stage,
        error = %alias_error,
        "alias load failed; trying stage"
    );

    match load_via_stage(client, name, &request.stage).await {
        Ok(loaded) => Ok(loaded),
        Err(stage_error) => Err(MlError::ModelLoad {
            name: name.clone(),
            alias: request.alias.clone(),
            stage: request.stage.clone(),
            alias_error: Box::new(alias_error),
            stage_error: Box::new(stage_error),
        }),
    }
}

async fn load_via_alias(
    client: &dyn TrackingClient,
    name: &str,
    alias: &str,
) -> Result<LoadedModel, MlError> {
    let version = client.get_model_version_by_alias(name, alias).await?;
    let model = fetch_model(client, name, &version.version).await?;
    Ok(LoadedModel {
        name: name.to_string(),
        version: version.version,
        via: ResolvedVia::Alias(alias.to_string()),
        model,
    })
}

async fn load_via_stage(
    client: &dyn TrackingClient,
    name: &str,
    stage: &str,
) -> Result<LoadedModel, MlError> {
    let versions = client.search_model_versions(name).await?;
    let latest = versions
        .iter()
        .filter(|v| v.in_stage(stage))
        .max_by_key(|v| v.number())
        .ok_or_else(|| {
            MlError::registry(format!("No version of '{name}' is in stage '{stage}'"))
        })?;
    let model = fetch_model(client, name, &latest.version).await?;
    Ok(LoadedModel {
        name: name.to_string(),
        version: latest.version.clone(),
        via: ResolvedVia::Stage(stage.to_string()),
        model,
    })
}

async fn fetch_model(
    client: &dyn TrackingClient,
    name: &str,
    version: &str,
) -> Result<RegressionModel, MlError> {
    let uri = client.get_model_version_download_uri(name, version).await?;
    tracing::debug!(model = name, version, uri = %uri, "downloading model artifact");
    let bytes = client.download_artifact(&uri, MODEL_ARTIFACT_FILE).await?;
    RegressionModel::from_json_bytes(&bytes)
}
