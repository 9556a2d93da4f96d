//! Per-field rule table for the `users` record.
//!
//! Every column the pipeline knows about is described once here: its name,
//! the kind of value it carries (which picks the parser and the anomaly
//! predicate), and whether a synthetic value may ever be substituted for it.
//! The flagger and remediator both walk this table instead of hard-coding
//! per-column branches.

use arrow::datatypes::{DataType, TimeUnit};

pub const ID: &str = "id";
pub const FIRST_NAME: &str = "first_name";
pub const LAST_NAME: &str = "last_name";
pub const EMAIL: &str = "email";
pub const PHONE: &str = "phone";
pub const STATUS: &str = "status";
pub const BIRTH_DATE: &str = "birth_date";
pub const CREATED_AT: &str = "created_at";

pub const IS_ANOMALOUS: &str = "is_anomalous";
pub const ROW_INDEX: &str = "row_index";
pub const REJECTION_REASON: &str = "rejection_reason";

/// How a column is parsed, and what counts as an anomaly for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// 32-bit integer; a failed cast is an anomaly.
    Int32,
    /// 64-bit integer; a failed cast is an anomaly.
    Int64,
    /// Calendar date; a failed or missing value is an anomaly.
    Date,
    /// Timestamp without zone; a failed or missing value is an anomaly.
    Timestamp,
    /// Personal name: whitespace collapsed, title-cased. Never flagged.
    Name,
    /// E-mail address: trimmed. Only flagged under strict enrollment.
    Email,
    /// Categorical token from a closed set.
    Status,
}

impl FieldKind {
    /// Arrow type of the typed (flagged / contracted) column.
    pub fn data_type(self) -> DataType {
        match self {
            Self::Int32 => DataType::Int32,
            Self::Int64 => DataType::Int64,
            Self::Date => DataType::Date32,
            Self::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
            Self::Name | Self::Email | Self::Status => DataType::Utf8,
        }
    }

    /// Whether a null typed value means the cast failed (and flags the record).
    pub fn null_is_anomaly(self) -> bool {
        matches!(self, Self::Int32 | Self::Int64 | Self::Date | Self::Timestamp)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Date => "date",
            Self::Timestamp => "timestamp",
            Self::Name => "name",
            Self::Email => "email",
            Self::Status => "status",
        }
    }
}

/// One row of the field table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRule {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Identity and temporal fields have no safe synthetic value.
    pub imputable: bool,
    /// Name of the column holding the original text in the flagged batch,
    /// for fields whose typed view can lose it.
    pub raw_column: Option<&'static str>,
}

/// Field table in contracted column order.
pub const USER_FIELDS: &[FieldRule] = &[
    FieldRule {
        name: ID,
        kind: FieldKind::Int32,
        imputable: false,
        raw_column: Some("raw_id"),
    },
    FieldRule {
        name: FIRST_NAME,
        kind: FieldKind::Name,
        imputable: true,
        raw_column: None,
    },
    FieldRule {
        name: LAST_NAME,
        kind: FieldKind::Name,
        imputable: true,
        raw_column: None,
    },
    FieldRule {
        name: EMAIL,
        kind: FieldKind::Email,
        imputable: true,
        raw_column: Some("raw_email"),
    },
    FieldRule {
        name: PHONE,
        kind: FieldKind::Int64,
        imputable: true,
        raw_column: Some("raw_phone"),
    },
    FieldRule {
        name: STATUS,
        kind: FieldKind::Status,
        imputable: false,
        raw_column: None,
    },
    FieldRule {
        name: BIRTH_DATE,
        kind: FieldKind::Date,
        imputable: false,
        raw_column: Some("raw_birth_date"),
    },
    FieldRule {
        name: CREATED_AT,
        kind: FieldKind::Timestamp,
        imputable: false,
        raw_column: Some("raw_created_at"),
    },
];

/// Look up a field rule by column name.
pub fn rule(name: &str) -> Option<&'static FieldRule> {
    USER_FIELDS.iter().find(|r| r.name == name)
}
