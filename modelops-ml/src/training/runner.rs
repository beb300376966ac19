//! Local training pipeline: split, fit, evaluate, write artifacts.

use crate::data::Dataset;
use crate::error::MlError;
use crate::training::estimator::RegressionModel;
use crate::training::metrics::RegressionMetrics;
use crate::training::params::TrainParams;
use crate::training::split::{min_rows_for_scoring, train_test_split};
use std::path::PathBuf;

/// Where `write_outputs` puts its files.
#[derive(Debug, Clone)]
pub struct TrainOutputs {
    pub model: PathBuf,
    pub metrics_json: PathBuf,
    pub metrics_txt: PathBuf,
}

/// Result of one training pass.
#[derive(Debug, Clone)]
pub struct TrainReport {
    pub model: RegressionModel,
    pub metrics: RegressionMetrics,
    pub train_rows: usize,
    pub test_rows: usize,
}

/// Split `dataset`, fit the configured estimator on the train side and
/// evaluate it on the held-out side.
pub fn run_training(dataset: &Dataset, params: &TrainParams) -> Result<TrainReport, MlError> {
    params.validate()?;
    let split = train_test_split(dataset.len(), params.test_size, params.random_state)?;
    if split.test.len() < 2 {
        let hint = match min_rows_for_scoring(params.test_size) {
            Some(min) => format!("use at least {min} rows or raise test_size"),
            None => "lower test_size".to_string(),
        };
        return Err(MlError::training(format!(
            "{} rows with test_size={} leave {} test row, and R2 needs at least two; {hint}",
            dataset.len(),
            params.test_size,
            split.test.len()
        )));
    }
    let (x_train, y_train) = dataset.select(&split.train);
    let (x_test, y_test) = dataset.select(&split.test);

    let estimator = params.estimator();
    let model = estimator.fit(
        &dataset.feature_name,
        &x_train,
        &y_train,
        params.fit_intercept,
    )?;
    let metrics = RegressionMetrics::compute(&y_test, &model.predict(&x_test))?;

    tracing::info!(
        estimator = estimator.name(),
        train_rows = x_train.len(),
        test_rows = x_test.len(),
        r2 = metrics.r2,
        mae = metrics.mae,
        "training finished"
    );
    Ok(TrainReport {
        model,
        metrics,
        train_rows: x_train.len(),
        test_rows: x_test.len(),
    })
}

/// Persist the model artifact and both metrics files.
pub fn write_outputs(report: &TrainReport, outputs: &TrainOutputs) -> Result<(), MlError> {
    report.model.save(&outputs.model)?;
    report.metrics.write_json(&outputs.metrics_json)?;
    report.metrics.write_text(&outputs.metrics_txt)?;
    Ok(())
}
