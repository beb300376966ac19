//! Column type inference for loaded datasets.

use serde::{Deserialize, Serialize};

/// Column data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    String,
    Boolean,
    Null,
}

impl ColumnType {
    /// Integer or float kind.
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Null => "null",
        };
        f.write_str(name)
    }
}

/// Schema for a single column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub dtype: ColumnType,
    pub nullable: bool,
}

/// Schema definition for a dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub columns: Vec<ColumnSchema>,
}

impl SchemaDefinition {
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Infer a column type from its values.
///
/// Any string makes the column a string column; otherwise a single float
/// widens an integer column to float. Nulls are ignored unless every value
/// is null.
pub fn infer_column_type(values: &[serde_json::Value]) -> ColumnType {
    let mut seen = None;
    for v in values {
        let kind = match v {
            serde_json::Value::Null => continue,
            serde_json::Value::Number(n) if n.is_f64() => ColumnType::Float,
            serde_json::Value::Number(_) => ColumnType::Integer,
            serde_json::Value::Bool(_) => ColumnType::Boolean,
            _ => return ColumnType::String,
        };
        seen = Some(match (seen, kind) {
            (None, k) => k,
            (Some(ColumnType::Integer), ColumnType::Float)
            | (Some(ColumnType::Float), ColumnType::Integer) => ColumnType::Float,
            (Some(prev), k) if prev == k => k,
            // bool mixed with numbers has no numeric reading
            _ => return ColumnType::String,
        });
    }
    seen.unwrap_or(ColumnType::Null)
}

/// Infer the schema of row-major data.
pub fn infer_schema(columns: &[String], rows: &[Vec<serde_json::Value>]) -> SchemaDefinition {
    let columns = columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let values: Vec<serde_json::Value> =
                rows.iter().filter_map(|row| row.get(i).cloned()).collect();
            ColumnSchema {
                name: name.clone(),
                dtype: infer_column_type(&values),
                nullable: values.iter().any(|v| v.is_null()) || values.len() < rows.len(),
            }
        })
        .collect();
    SchemaDefinition { columns }
}
