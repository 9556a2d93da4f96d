use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("valid status set is empty")]
    EmptyStatusSet,

    #[error("status token '{0}' is not canonical (expected trimmed lowercase)")]
    NonCanonicalStatus(String),

    #[error("safe status '{0}' is not in the valid status set")]
    SafeStatusNotValid(String),

    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("field '{0}' has no safe synthetic value and cannot be imputed")]
    NotImputable(String),

    #[error("imputation for '{field}' must be {expected}")]
    ImputationType { field: String, expected: &'static str },

    #[error("no date formats configured")]
    NoDateFormats,
}

/// Failure turning an Arrow batch back into row structs.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("column '{0}' missing or of unexpected type")]
    Column(String),

    #[error("row {row}: null in non-nullable column '{column}'")]
    NullValue { row: usize, column: String },

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}
