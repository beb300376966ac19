//! Data loading, schema inference and contract checks.

pub mod schema;
pub mod source;
pub mod validate;

pub use schema::{ColumnType, SchemaDefinition};
pub use source::{CsvSource, DataBatch, Dataset};
pub use validate::{ContractReport, ContractViolation, DataContract, check_contract};
