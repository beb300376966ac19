//! One-feature linear estimators and the fitted model artifact.
//!
//! All three estimators have closed-form solutions for a single feature:
//!
//! - ordinary least squares: `w = Sxy / Sxx`
//! - ridge, `‖y − wx − b‖² + α·w²`: `w = Sxy / (Sxx + α)`
//! - lasso, `(1/2n)‖y − wx − b‖² + α·|w|`: `w = soft(Sxy/n, α) / (Sxx/n)`
//!
//! where `Sxx`, `Sxy` are sums over centered data when an intercept is fitted
//! and over raw data otherwise. The intercept is never penalized.

use crate::error::MlError;
use crate::training::metrics::r2_score;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Estimator family and its hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Estimator {
    Linear,
    Ridge { alpha: f64 },
    Lasso { alpha: f64 },
}

impl Estimator {
    /// Display name, also used as run name and local artifact stem.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Linear => "LinearRegression",
            Self::Ridge { .. } => "Ridge",
            Self::Lasso { .. } => "Lasso",
        }
    }

    pub fn alpha(&self) -> Option<f64> {
        match self {
            Self::Linear => None,
            Self::Ridge { alpha } | Self::Lasso { alpha } => Some(*alpha),
        }
    }

    /// Fit on paired samples `x`, `y`.
    pub fn fit(
        &self,
        feature_name: &str,
        x: &[f64],
        y: &[f64],
        fit_intercept: bool,
    ) -> Result<RegressionModel, MlError> {
        if x.len() != y.len() {
            return Err(MlError::training(format!(
                "feature has {} values but target has {}",
                x.len(),
                y.len()
            )));
        }
        if x.is_empty() {
            return Err(MlError::training("cannot fit on zero samples"));
        }
        if x.iter().chain(y).any(|v| !v.is_finite()) {
            return Err(MlError::training("training data contains NaN or infinite values"));
        }
        if let Some(alpha) = self.alpha() {
            if !(alpha.is_finite() && alpha >= 0.0) {
                return Err(MlError::training(format!(
                    "alpha must be a non-negative number, got {alpha}"
                )));
            }
        }

        let n = x.len() as f64;
        let (x_mean, y_mean) = if fit_intercept {
            (x.iter().sum::<f64>() / n, y.iter().sum::<f64>() / n)
        } else {
            (0.0, 0.0)
        };
        let (sxx, sxy) = x.iter().zip(y).fold((0.0, 0.0), |(sxx, sxy), (xi, yi)| {
            let dx = xi - x_mean;
            (sxx + dx * dx, sxy + dx * (yi - y_mean))
        });

        let coef = match *self {
            _ if sxx == 0.0 => 0.0,
            Self::Linear => sxy / sxx,
            Self::Ridge { alpha } => sxy / (sxx + alpha),
            Self::Lasso { alpha } => soft_threshold(sxy / n, alpha) / (sxx / n),
        };
        let intercept = if fit_intercept {
            y_mean - coef * x_mean
        } else {
            0.0
        };

        tracing::debug!(
            estimator = self.name(),
            coef,
            intercept,
            samples = x.len(),
            "fitted estimator"
        );
        Ok(RegressionModel {
            estimator: *self,
            feature: feature_name.to_string(),
            coef,
            intercept,
            fit_intercept,
            trained_at: Utc::now(),
        })
    }
}

fn soft_threshold(value: f64, threshold: f64) -> f64 {
    value.signum() * (value.abs() - threshold).max(0.0)
}

/// A fitted one-feature linear model. This is the persisted model artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionModel {
    pub estimator: Estimator,
    pub feature: String,
    pub coef: f64,
    pub intercept: f64,
    pub fit_intercept: bool,
    pub trained_at: DateTime<Utc>,
}

impl RegressionModel {
    pub fn predict_one(&self, x: f64) -> f64 {
        self.coef * x + self.intercept
    }

    pub fn predict(&self, xs: &[f64]) -> Vec<f64> {
        xs.iter().map(|&x| self.predict_one(x)).collect()
    }

    /// Coefficient of determination on `(x, y)`.
    pub fn score(&self, x: &[f64], y: &[f64]) -> Result<f64, MlError> {
        r2_score(y, &self.predict(x))
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, MlError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, MlError> {
        serde_json::from_slice(bytes)
            .map_err(|e| MlError::model(format!("not a regression model artifact: {e}")))
    }

    /// Write atomically via a temporary sibling file.
    pub fn save(&self, path: &Path) -> Result<(), MlError> {
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, self.to_json_bytes()?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, MlError> {
        if !path.exists() {
            return Err(MlError::model(format!("{} not found", path.display())));
        }
        Self::from_json_bytes(&std::fs::read(path)?)
    }
}
