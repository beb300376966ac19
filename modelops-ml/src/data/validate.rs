//! Dataset contract checks run before training.

use crate::data::schema::ColumnType;
use crate::data::source::DataBatch;
use modelops_core::config::DataContractConfig;
use serde::{Deserialize, Serialize};

/// What a training CSV must look like.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataContract {
    pub feature_column: String,
    pub target_column: String,
    pub min_rows: usize,
}

impl From<&DataContractConfig> for DataContract {
    fn from(config: &DataContractConfig) -> Self {
        Self {
            feature_column: config.feature_column.clone(),
            target_column: config.target_column.clone(),
            min_rows: config.min_rows,
        }
    }
}

/// A single broken expectation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContractViolation {
    MissingColumn { column: String },
    NonNumeric { column: String, dtype: ColumnType },
    TooFewRows { found: usize, required: usize },
}

impl std::fmt::Display for ContractViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingColumn { column } => write!(f, "column '{column}' is missing"),
            Self::NonNumeric { column, dtype } => {
                write!(f, "column '{column}' is {dtype}, expected integer or float")
            }
            Self::TooFewRows { found, required } => {
                write!(f, "found {found} rows, need at least {required}")
            }
        }
    }
}

/// Outcome of a contract check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractReport {
    pub rows: usize,
    pub columns: usize,
    pub violations: Vec<ContractViolation>,
}

impl ContractReport {
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Check `batch` against `contract`, collecting every violation.
pub fn check_contract(batch: &DataBatch, contract: &DataContract) -> ContractReport {
    let schema = batch.schema();
    let mut violations = Vec::new();

    for column in [&contract.feature_column, &contract.target_column] {
        match schema.column(column) {
            None => violations.push(ContractViolation::MissingColumn {
                column: column.clone(),
            }),
            Some(col) if !col.dtype.is_numeric() || col.nullable => {
                violations.push(ContractViolation::NonNumeric {
                    column: column.clone(),
                    dtype: col.dtype,
                })
            }
            Some(_) => {}
        }
    }

    if batch.row_count() < contract.min_rows {
        violations.push(ContractViolation::TooFewRows {
            found: batch.row_count(),
            required: contract.min_rows,
        });
    }

    ContractReport {
        rows: batch.row_count(),
        columns: batch.column_count(),
        violations,
    }
}
