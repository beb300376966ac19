//! Error types for the modelops-ml crate.

use thiserror::Error;

use crate::gate::GateError;
use crate::tracking::TrackingError;

/// Top-level error type for ML operations.
#[derive(Debug, Error)]
pub enum MlError {
    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Invalid parameters: {0}")]
    Params(String),

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error(transparent)]
    Tracking(#[from] TrackingError),

    #[error("MLflow URI not reachable from this process: {uri}\nTry:\n  {hint}")]
    Unreachable { uri: String, hint: String },

    #[error(
        "Could not load model '{name}' via alias '@{alias}' or stage '{stage}'.\nAlias error: {alias_error}\nStage error: {stage_error}"
    )]
    ModelLoad {
        name: String,
        alias: String,
        stage: String,
        alias_error: Box<MlError>,
        stage_error: Box<MlError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl MlError {
    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    pub fn registry(msg: impl Into<String>) -> Self {
        Self::Registry(msg.into())
    }

    pub fn params(msg: impl Into<String>) -> Self {
        Self::Params(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_load_message_combines_both_errors() {
        let err = MlError::ModelLoad {
            name: "reg".into(),
            alias: "staging".into(),
            stage: "Staging".into(),
            alias_error: Box::new(MlError::registry("alias missing")),
            stage_error: Box::new(MlError::registry("no version in stage")),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Could not load model 'reg' via alias '@staging' or stage 'Staging'."));
        assert!(msg.contains("Alias error: Registry error: alias missing"));
        assert!(msg.contains("Stage error: Registry error: no version in stage"));
    }

    #[test]
    fn test_unreachable_message_has_hint() {
        let err = MlError::Unreachable {
            uri: "http://127.0.0.1:5000".into(),
            hint: "curl -i http://127.0.0.1:5000".into(),
        };
        assert!(err.to_string().contains("Try:\n  curl -i"));
    }
}
