use arrow::datatypes::DataType;
use remedia_core::{ConfigError, RecordError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("missing column: {0}")]
    MissingColumn(String),

    #[error("column '{column}' has type {actual}, expected {expected}")]
    ColumnType {
        column: String,
        expected: DataType,
        actual: DataType,
    },

    /// Records whose identity or temporal fields are null with no safe
    /// default, under [`RejectionMode::Abort`](remedia_core::RejectionMode::Abort).
    #[error("{} record(s) have unresolvable null fields: {summary}", .rows.len())]
    UnresolvableRecords { rows: Vec<usize>, summary: String },

    /// The remediated output does not satisfy the contract. This is a defect
    /// in the remediation policy, never a property of the input.
    #[error("contract breach on column '{column}': {detail}")]
    ContractBreach { column: String, detail: String },

    #[error("record error: {0}")]
    Record(#[from] RecordError),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}
