//! Regression metrics and the metrics files consumed by the CI gate.

use crate::error::MlError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Regression metrics. Serialized as the `metrics.json` schema.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    #[serde(rename = "R2")]
    pub r2: f64,
    #[serde(rename = "MAE")]
    pub mae: f64,
    #[serde(rename = "MSE")]
    pub mse: f64,
    #[serde(rename = "RMSE")]
    pub rmse: f64,
}

impl RegressionMetrics {
    pub fn compute(y_true: &[f64], y_pred: &[f64]) -> Result<Self, MlError> {
        let r2 = r2_score(y_true, y_pred)?;
        let n = y_true.len() as f64;
        let (abs_sum, sq_sum) = y_true
            .iter()
            .zip(y_pred)
            .fold((0.0, 0.0), |(a, s), (t, p)| {
                let e = t - p;
                (a + e.abs(), s + e * e)
            });
        let mse = sq_sum / n;
        Ok(Self {
            r2,
            mae: abs_sum / n,
            mse,
            rmse: mse.sqrt(),
        })
    }

    /// `metrics.txt` body. `R2:` comes first so the gate pattern finds it.
    pub fn to_text(&self) -> String {
        format!(
            "R2: {:.4}\nMAE: {:.4}\nMSE: {:.4}\nRMSE: {:.4}\n",
            self.r2, self.mae, self.mse, self.rmse
        )
    }

    pub fn write_json(&self, path: &Path) -> Result<(), MlError> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn write_text(&self, path: &Path) -> Result<(), MlError> {
        std::fs::write(path, self.to_text())?;
        Ok(())
    }

    pub fn read_json(path: &Path) -> Result<Self, MlError> {
        Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
    }
}

/// Coefficient of determination, `1 − SS_res / SS_tot`.
///
/// A constant target gives 1.0 for a perfect prediction and 0.0 otherwise.
pub fn r2_score(y_true: &[f64], y_pred: &[f64]) -> Result<f64, MlError> {
    if y_true.len() != y_pred.len() {
        return Err(MlError::training(format!(
            "r2_score: {} targets but {} predictions",
            y_true.len(),
            y_pred.len()
        )));
    }
    if y_true.len() < 2 {
        return Err(MlError::training(
            "R2 is undefined for fewer than two samples; add rows or raise test_size",
        ));
    }
    let mean = y_true.iter().sum::<f64>() / y_true.len() as f64;
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return Ok(if ss_res == 0.0 { 1.0 } else { 0.0 });
    }
    Ok(1.0 - ss_res / ss_tot)
}
