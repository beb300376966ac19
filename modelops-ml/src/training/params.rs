//! `params.yaml` training parameters.

use crate::error::MlError;
use crate::training::estimator::Estimator;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which estimator `train` fits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorChoice {
    #[default]
    Linear,
    Ridge,
    Lasso,
}

/// The `train` section of `params.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainParams {
    #[serde(default = "default_true")]
    pub fit_intercept: bool,
    #[serde(default = "default_test_size")]
    pub test_size: f64,
    #[serde(default = "default_random_state")]
    pub random_state: u64,
    #[serde(default)]
    pub estimator: EstimatorChoice,
    /// Regularization strength for ridge and lasso.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
}

impl Default for TrainParams {
    fn default() -> Self {
        Self {
            fit_intercept: true,
            test_size: default_test_size(),
            random_state: default_random_state(),
            estimator: EstimatorChoice::Linear,
            alpha: default_alpha(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_test_size() -> f64 {
    0.2
}

fn default_random_state() -> u64 {
    42
}

fn default_alpha() -> f64 {
    1.0
}

#[derive(Deserialize)]
struct ParamsFile {
    train: Option<TrainParams>,
}

impl TrainParams {
    pub fn load(path: &Path) -> Result<Self, MlError> {
        if !path.exists() {
            return Err(MlError::params(format!("{} not found", path.display())));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, MlError> {
        let file: ParamsFile = serde_yaml::from_str(content)?;
        let params = file
            .train
            .ok_or_else(|| MlError::params("missing 'train' section"))?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), MlError> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(MlError::params(format!(
                "test_size must be in (0, 1), got {}",
                self.test_size
            )));
        }
        if !(self.alpha.is_finite() && self.alpha >= 0.0) {
            return Err(MlError::params(format!(
                "alpha must be a non-negative number, got {}",
                self.alpha
            )));
        }
        Ok(())
    }

    pub fn estimator(&self) -> Estimator {
        match self.estimator {
            EstimatorChoice::Linear => Estimator::Linear,
            EstimatorChoice::Ridge => Estimator::Ridge { alpha: self.alpha },
            EstimatorChoice::Lasso => Estimator::Lasso { alpha: self.alpha },
        }
    }
}
