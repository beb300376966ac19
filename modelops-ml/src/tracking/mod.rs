//! Client side of the experiment tracker and model registry.
//!
//! [`TrackingClient`] is the seam between the pipeline steps and the server.
//! [`MlflowClient`] speaks the MLflow REST API; [`InMemoryTracking`] is a
//! process-local stand-in with the same semantics.

pub mod artifacts;
pub mod memory;
pub mod mlflow;
pub mod types;

pub use artifacts::ArtifactLocation;
pub use memory::InMemoryTracking;
pub use mlflow::MlflowClient;
pub use types::{Experiment, KeyValue, Metric, ModelVersion, Run, RunData, RunInfo, RunStatus};

use async_trait::async_trait;

/// MLflow error code for a missing entity.
pub const RESOURCE_DOES_NOT_EXIST: &str = "RESOURCE_DOES_NOT_EXIST";
/// MLflow error code for a create on an existing entity.
pub const RESOURCE_ALREADY_EXISTS: &str = "RESOURCE_ALREADY_EXISTS";
/// Returned by servers that predate an endpoint.
pub const ENDPOINT_NOT_FOUND: &str = "ENDPOINT_NOT_FOUND";

/// Errors from talking to the tracking server.
#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    #[error("tracking server not reachable at {uri}: {reason}")]
    Unreachable { uri: String, reason: String },

    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{code} (HTTP {status}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("unexpected response from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },

    #[error("unsupported artifact URI '{0}'")]
    UnsupportedArtifactUri(String),

    #[error("artifact IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrackingError {
    pub fn api(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::api(404, RESOURCE_DOES_NOT_EXIST, message)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status, code, .. } if *status == 404 || code == RESOURCE_DOES_NOT_EXIST)
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::Api { code, .. } if code == RESOURCE_ALREADY_EXISTS)
    }

    /// Whether the server appears not to support registered-model aliases:
    /// a 404, an unknown endpoint, or an error that talks about aliases.
    pub fn suggests_missing_alias_support(&self) -> bool {
        match self {
            Self::Api {
                status,
                code,
                message,
            } => {
                *status == 404
                    || code == ENDPOINT_NOT_FOUND
                    || message.to_ascii_lowercase().contains("alias")
            }
            _ => false,
        }
    }
}

/// Operations the pipeline needs from a tracking server and model registry.
#[async_trait]
pub trait TrackingClient: Send + Sync {
    /// Base URI, for messages.
    fn tracking_uri(&self) -> &str;

    /// Check the server answers at all. Any non-5xx response counts.
    async fn probe(&self, experiment_name: &str) -> Result<(), TrackingError>;

    async fn get_experiment_by_name(&self, name: &str)
    -> Result<Option<Experiment>, TrackingError>;

    /// Create an experiment and return its id.
    async fn create_experiment(&self, name: &str) -> Result<String, TrackingError>;

    /// Runs of the given experiments, unfiltered and unordered, at most `max_results`.
    async fn search_runs(
        &self,
        experiment_ids: &[String],
        max_results: usize,
    ) -> Result<Vec<Run>, TrackingError>;

    async fn create_run(&self, experiment_id: &str, run_name: &str)
    -> Result<RunInfo, TrackingError>;

    async fn log_metric(&self, run_id: &str, key: &str, value: f64) -> Result<(), TrackingError>;

    async fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<(), TrackingError>;

    async fn set_run_tag(&self, run_id: &str, key: &str, value: &str)
    -> Result<(), TrackingError>;

    async fn finish_run(&self, run_id: &str, status: RunStatus) -> Result<(), TrackingError>;

    /// Store `bytes` at `relative_path` below `artifact_uri`.
    async fn upload_artifact(
        &self,
        artifact_uri: &str,
        relative_path: &str,
        bytes: Vec<u8>,
    ) -> Result<(), TrackingError>;

    async fn download_artifact(
        &self,
        artifact_uri: &str,
        relative_path: &str,
    ) -> Result<Vec<u8>, TrackingError>;

    /// Create a registered model. An existing model with that name is not an error.
    async fn create_registered_model(&self, name: &str) -> Result<(), TrackingError>;

    async fn create_model_version(
        &self,
        name: &str,
        source: &str,
        run_id: &str,
    ) -> Result<ModelVersion, TrackingError>;

    /// Every version registered under `name`.
    async fn search_model_versions(&self, name: &str) -> Result<Vec<ModelVersion>, TrackingError>;

    async fn set_registered_model_alias(
        &self,
        name: &str,
        alias: &str,
        version: &str,
    ) -> Result<(), TrackingError>;

    async fn get_model_version_by_alias(
        &self,
        name: &str,
        alias: &str,
    ) -> Result<ModelVersion, TrackingError>;

    async fn set_model_version_tag(
        &self,
        name: &str,
        version: &str,
        key: &str,
        value: &str,
    ) -> Result<(), TrackingError>;

    /// Legacy stage transition. With `archive_existing`, other versions in
    /// `stage` move to `Archived`.
    async fn transition_model_version_stage(
        &self,
        name: &str,
        version: &str,
        stage: &str,
        archive_existing: bool,
    ) -> Result<ModelVersion, TrackingError>;

    async fn get_model_version_download_uri(
        &self,
        name: &str,
        version: &str,
    ) -> Result<String, TrackingError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_support_heuristic() {
        assert!(TrackingError::api(404, "X", "nope").suggests_missing_alias_support());
        assert!(
            TrackingError::api(400, ENDPOINT_NOT_FOUND, "unknown").suggests_missing_alias_support()
        );
        assert!(
            TrackingError::api(400, "INVALID_PARAMETER_VALUE", "Invalid Alias name")
                .suggests_missing_alias_support()
        );
        assert!(
            !TrackingError::api(500, "INTERNAL_ERROR", "db down").suggests_missing_alias_support()
        );
        assert!(
            !TrackingError::Decode {
                endpoint: "x".into(),
                reason: "alias".into()
            }
            .suggests_missing_alias_support()
        );
    }

    #[test]
    fn test_not_found_detection() {
        assert!(TrackingError::not_found("gone").is_not_found());
        assert!(TrackingError::api(400, RESOURCE_DOES_NOT_EXIST, "gone").is_not_found());
        assert!(!TrackingError::api(400, RESOURCE_ALREADY_EXISTS, "dup").is_not_found());
        assert!(TrackingError::api(400, RESOURCE_ALREADY_EXISTS, "dup").is_already_exists());
    }
}
