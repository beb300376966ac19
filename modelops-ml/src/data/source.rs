//! Loading tabular data from CSV files.

use crate::data::schema::{SchemaDefinition, infer_schema};
use crate::error::MlError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A batch of data rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub total_rows: usize,
}

impl DataBatch {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn schema(&self) -> SchemaDefinition {
        infer_schema(&self.columns, &self.rows)
    }

    /// Values of a numeric column. Fails on the first null or non-numeric cell.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<f64>, MlError> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| MlError::dataset(format!("missing column '{name}'")))?;
        self.rows
            .iter()
            .enumerate()
            .map(|(row_idx, row)| {
                row.get(idx)
                    .and_then(serde_json::Value::as_f64)
                    .ok_or_else(|| {
                        MlError::dataset(format!(
                            "column '{name}' row {}: expected a number",
                            row_idx + 1
                        ))
                    })
            })
            .collect()
    }
}

/// CSV file data source. The first record is the header.
pub struct CsvSource {
    pub path: PathBuf,
    pub delimiter: u8,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delimiter: b',',
        }
    }

    pub fn load(&self) -> Result<DataBatch, MlError> {
        if !self.path.exists() {
            return Err(MlError::dataset(format!(
                "{} not found",
                self.path.display()
            )));
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(self.delimiter)
            .trim(csv::Trim::All)
            .from_path(&self.path)?;

        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if columns.iter().all(String::is_empty) {
            return Err(MlError::dataset(format!(
                "{} has no header row",
                self.path.display()
            )));
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(parse_cell).collect());
        }

        tracing::debug!(
            path = %self.path.display(),
            rows = rows.len(),
            columns = columns.len(),
            "loaded csv"
        );
        let total_rows = rows.len();
        Ok(DataBatch {
            columns,
            rows,
            total_rows,
        })
    }
}

fn parse_cell(raw: &str) -> serde_json::Value {
    let s = raw.trim_matches('"');
    if s.is_empty() {
        serde_json::Value::Null
    } else if let Ok(i) = s.parse::<i64>() {
        serde_json::Value::Number(i.into())
    } else if let Some(n) = s
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
    {
        serde_json::Value::Number(n)
    } else if s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("false") {
        serde_json::Value::Bool(s.eq_ignore_ascii_case("true"))
    } else {
        serde_json::Value::String(s.to_string())
    }
}

/// Numeric one-feature view of a dataset, ready for fitting.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub feature_name: String,
    pub feature: Vec<f64>,
    pub target: Vec<f64>,
}

impl Dataset {
    pub fn from_batch(batch: &DataBatch, feature: &str, target: &str) -> Result<Self, MlError> {
        Ok(Self {
            feature_name: feature.to_string(),
            feature: batch.numeric_column(feature)?,
            target: batch.numeric_column(target)?,
        })
    }

    pub fn load_csv(path: &Path, feature: &str, target: &str) -> Result<Self, MlError> {
        let batch = CsvSource::new(path).load()?;
        Self::from_batch(&batch, feature, target)
    }

    pub fn len(&self) -> usize {
        self.feature.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feature.is_empty()
    }

    /// Rows at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> (Vec<f64>, Vec<f64>) {
        indices
            .iter()
            .map(|&i| (self.feature[i], self.target[i]))
            .unzip()
    }
}
