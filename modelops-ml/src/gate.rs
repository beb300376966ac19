//! CI quality gate on the R² recorded in `metrics.txt`.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static R2_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)R2:\s*(-?[0-9.]+)").unwrap());

/// Malformed or missing gate input. Always exit code 2.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("{} not found. Did training run?", .0.display())]
    MetricsMissing(PathBuf),

    #[error("Could not parse R2 from {}", .0.display())]
    MetricsUnparsable(PathBuf),

    #[error("{} not found", .0.display())]
    ThresholdMissing(PathBuf),

    #[error("Could not parse threshold from {}: {value:?}", .path.display())]
    ThresholdUnparsable { path: PathBuf, value: String },

    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl GateError {
    pub fn exit_code(&self) -> u8 {
        2
    }
}

/// Result of comparing the current R² to the threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateOutcome {
    Passed { current: f64, threshold: f64 },
    Failed { current: f64, threshold: f64 },
}

impl GateOutcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Passed { .. } => 0,
            Self::Failed { .. } => 1,
        }
    }

    pub fn passed(&self) -> bool {
        matches!(self, Self::Passed { .. })
    }

    pub fn summary(&self) -> String {
        let (Self::Passed { current, threshold } | Self::Failed { current, threshold }) = self;
        format!("Current R2={current:.4} / Threshold={threshold:.4}")
    }

    pub fn verdict(&self) -> &'static str {
        match self {
            Self::Passed { .. } => "Gate passed.",
            Self::Failed { .. } => "Gate failed: R2 below threshold.",
        }
    }
}

/// First `R2: <number>` in `text`, case-insensitive.
pub fn parse_r2(text: &str) -> Option<f64> {
    R2_PATTERN
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// A threshold file holds one number, surrounding whitespace ignored.
pub fn parse_threshold(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|t| t.is_finite())
}

pub fn evaluate(current: f64, threshold: f64) -> GateOutcome {
    if current < threshold {
        GateOutcome::Failed { current, threshold }
    } else {
        GateOutcome::Passed { current, threshold }
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, GateError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(GateError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Read both files and compare.
pub fn run_gate(metrics_path: &Path, threshold_path: &Path) -> Result<GateOutcome, GateError> {
    let metrics = read_optional(metrics_path)?
        .ok_or_else(|| GateError::MetricsMissing(metrics_path.to_path_buf()))?;
    let current =
        parse_r2(&metrics).ok_or_else(|| GateError::MetricsUnparsable(metrics_path.to_path_buf()))?;

    let raw = read_optional(threshold_path)?
        .ok_or_else(|| GateError::ThresholdMissing(threshold_path.to_path_buf()))?;
    let threshold = parse_threshold(&raw).ok_or_else(|| GateError::ThresholdUnparsable {
        path: threshold_path.to_path_buf(),
        value: raw.trim().to_string(),
    })?;

    let outcome = evaluate(current, threshold);
    tracing::info!(current, threshold, passed = outcome.passed(), "gate evaluated");
    Ok(outcome)
}
