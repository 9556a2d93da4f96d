//! Row structs for each pipeline stage and their Arrow conversions.
//!
//! The pipeline itself is columnar; these types back the row-at-a-time
//! reference implementation and make batches easy to build and inspect in
//! tests and at the edges.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Date32Array, Int32Array, Int64Array, StringArray,
    TimestampMicrosecondArray,
};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use chrono::{NaiveDate, NaiveDateTime};

use crate::error::RecordError;
use crate::field;
use crate::normalize::{date_to_days, timestamp_to_micros};
use crate::schema::users;

/// One untrusted input row. Every field is optional text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    pub id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: Option<String>,
    pub birth_date: Option<String>,
    pub created_at: Option<String>,
}

/// A typed view of a [`RawRecord`] with its anomaly flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlaggedRecord {
    pub id: Option<i32>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<i64>,
    /// Canonical token when valid, otherwise the original value.
    pub status: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub created_at: Option<NaiveDateTime>,
    pub is_anomalous: bool,
    pub raw_id: Option<String>,
    pub raw_email: Option<String>,
    pub raw_phone: Option<String>,
    pub raw_birth_date: Option<String>,
    pub raw_created_at: Option<String>,
}

/// A record that satisfies the output contract.
///
/// Fields the active contract marks NOT NULL are always `Some`; `status` is
/// always present and within the valid set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractedRecord {
    pub id: Option<i32>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<i64>,
    pub status: String,
    pub birth_date: Option<NaiveDate>,
    pub created_at: Option<NaiveDateTime>,
}

impl From<&ContractedRecord> for RawRecord {
    /// Render a contracted record back as text, as a source re-reading the
    /// contracted table would see it.
    fn from(r: &ContractedRecord) -> Self {
        Self {
            id: r.id.map(|v| v.to_string()),
            first_name: r.first_name.clone(),
            last_name: r.last_name.clone(),
            email: r.email.clone(),
            phone: r.phone.map(|v| v.to_string()),
            status: Some(r.status.clone()),
            birth_date: r.birth_date.map(|d| d.format("%Y-%m-%d").to_string()),
            created_at: r
                .created_at
                .map(|t| t.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        }
    }
}

/// Build a raw batch (all-text columns) from rows.
pub fn raw_batch(records: &[RawRecord]) -> Result<RecordBatch, ArrowError> {
    let text = |f: fn(&RawRecord) -> &Option<String>| -> ArrayRef {
        Arc::new(records.iter().map(|r| f(r).as_deref()).collect::<StringArray>())
    };
    let columns = vec![
        text(|r| &r.id),
        text(|r| &r.first_name),
        text(|r| &r.last_name),
        text(|r| &r.email),
        text(|r| &r.phone),
        text(|r| &r.status),
        text(|r| &r.birth_date),
        text(|r| &r.created_at),
    ];
    RecordBatch::try_new(Arc::new(users::raw_schema()), columns)
}

/// Build a flagged batch from rows.
pub fn flagged_batch(records: &[FlaggedRecord]) -> Result<RecordBatch, ArrowError> {
    let text = |f: fn(&FlaggedRecord) -> &Option<String>| -> ArrayRef {
        Arc::new(records.iter().map(|r| f(r).as_deref()).collect::<StringArray>())
    };
    let columns: Vec<ArrayRef> = vec![
        Arc::new(records.iter().map(|r| r.id).collect::<Int32Array>()),
        text(|r| &r.first_name),
        text(|r| &r.last_name),
        text(|r| &r.email),
        Arc::new(records.iter().map(|r| r.phone).collect::<Int64Array>()),
        text(|r| &r.status),
        Arc::new(
            records
                .iter()
                .map(|r| r.birth_date.map(date_to_days))
                .collect::<Date32Array>(),
        ),
        Arc::new(
            records
                .iter()
                .map(|r| r.created_at.map(timestamp_to_micros))
                .collect::<TimestampMicrosecondArray>(),
        ),
        Arc::new(
            records
                .iter()
                .map(|r| Some(r.is_anomalous))
                .collect::<BooleanArray>(),
        ),
        text(|r| &r.raw_id),
        text(|r| &r.raw_email),
        text(|r| &r.raw_phone),
        text(|r| &r.raw_birth_date),
        text(|r| &r.raw_created_at),
    ];
    RecordBatch::try_new(Arc::new(users::flagged_schema()), columns)
}

impl FlaggedRecord {
    /// Read every row of a flagged batch.
    pub fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>, RecordError> {
        let id = column::<Int32Array>(batch, field::ID)?;
        let first_name = column::<StringArray>(batch, field::FIRST_NAME)?;
        let last_name = column::<StringArray>(batch, field::LAST_NAME)?;
        let email = column::<StringArray>(batch, field::EMAIL)?;
        let phone = column::<Int64Array>(batch, field::PHONE)?;
        let status = column::<StringArray>(batch, field::STATUS)?;
        let birth_date = column::<Date32Array>(batch, field::BIRTH_DATE)?;
        let created_at = column::<TimestampMicrosecondArray>(batch, field::CREATED_AT)?;
        let is_anomalous = column::<BooleanArray>(batch, field::IS_ANOMALOUS)?;
        let raw_id = column::<StringArray>(batch, "raw_id")?;
        let raw_email = column::<StringArray>(batch, "raw_email")?;
        let raw_phone = column::<StringArray>(batch, "raw_phone")?;
        let raw_birth_date = column::<StringArray>(batch, "raw_birth_date")?;
        let raw_created_at = column::<StringArray>(batch, "raw_created_at")?;

        (0..batch.num_rows())
            .map(|i| {
                if is_anomalous.is_null(i) {
                    return Err(RecordError::NullValue {
                        row: i,
                        column: field::IS_ANOMALOUS.to_string(),
                    });
                }
                Ok(Self {
                    id: id.is_valid(i).then(|| id.value(i)),
                    first_name: text_at(first_name, i),
                    last_name: text_at(last_name, i),
                    email: text_at(email, i),
                    phone: phone.is_valid(i).then(|| phone.value(i)),
                    status: text_at(status, i),
                    birth_date: date_at(birth_date, i),
                    created_at: timestamp_at(created_at, i),
                    is_anomalous: is_anomalous.value(i),
                    raw_id: text_at(raw_id, i),
                    raw_email: text_at(raw_email, i),
                    raw_phone: text_at(raw_phone, i),
                    raw_birth_date: text_at(raw_birth_date, i),
                    raw_created_at: text_at(raw_created_at, i),
                })
            })
            .collect()
    }
}

impl ContractedRecord {
    /// Read every row of a contracted batch.
    pub fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>, RecordError> {
        let id = column::<Int32Array>(batch, field::ID)?;
        let first_name = column::<StringArray>(batch, field::FIRST_NAME)?;
        let last_name = column::<StringArray>(batch, field::LAST_NAME)?;
        let email = column::<StringArray>(batch, field::EMAIL)?;
        let phone = column::<Int64Array>(batch, field::PHONE)?;
        let status = column::<StringArray>(batch, field::STATUS)?;
        let birth_date = column::<Date32Array>(batch, field::BIRTH_DATE)?;
        let created_at = column::<TimestampMicrosecondArray>(batch, field::CREATED_AT)?;

        (0..batch.num_rows())
            .map(|i| {
                let status = text_at(status, i).ok_or_else(|| RecordError::NullValue {
                    row: i,
                    column: field::STATUS.to_string(),
                })?;
                Ok(Self {
                    id: id.is_valid(i).then(|| id.value(i)),
                    first_name: text_at(first_name, i),
                    last_name: text_at(last_name, i),
                    email: text_at(email, i),
                    phone: phone.is_valid(i).then(|| phone.value(i)),
                    status,
                    birth_date: date_at(birth_date, i),
                    created_at: timestamp_at(created_at, i),
                })
            })
            .collect()
    }
}

// ── Arrow extraction helpers ──

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T, RecordError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| RecordError::Column(name.to_string()))
}

fn text_at(arr: &StringArray, i: usize) -> Option<String> {
    arr.is_valid(i).then(|| arr.value(i).to_string())
}

fn date_at(arr: &Date32Array, i: usize) -> Option<NaiveDate> {
    if arr.is_null(i) {
        return None;
    }
    arr.value_as_date(i)
}

fn timestamp_at(arr: &TimestampMicrosecondArray, i: usize) -> Option<NaiveDateTime> {
    if arr.is_null(i) {
        return None;
    }
    arr.value_as_datetime(i)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_flagged() -> FlaggedRecord {
        FlaggedRecord {
            id: Some(7),
            first_name: Some("Ann".into()),
            last_name: None,
            email: Some("ann@example.com".into()),
            phone: Some(5_551_234),
            status: Some("active".into()),
            birth_date: NaiveDate::from_ymd_opt(1990, 4, 2),
            created_at: NaiveDate::from_ymd_opt(2020, 1, 1).and_then(|d| d.and_hms_opt(9, 30, 0)),
            is_anomalous: false,
            raw_id: Some("7".into()),
            raw_email: Some(" ann@example.com".into()),
            raw_phone: Some("5551234".into()),
            raw_birth_date: Some("04/02/1990".into()),
            raw_created_at: Some("2020-01-01 09:30:00".into()),
        }
    }

    #[test]
    fn raw_batch_matches_raw_schema() {
        let batch = raw_batch(&[
            RawRecord {
                id: Some("1".into()),
                ..Default::default()
            },
            RawRecord::default(),
        ])
        .unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.schema().as_ref(), &users::raw_schema());
        assert_eq!(batch.column(0).null_count(), 1);
    }

    #[test]
    fn flagged_rows_survive_a_batch() {
        let mut anomalous = sample_flagged();
        anomalous.id = None;
        anomalous.birth_date = None;
        anomalous.is_anomalous = true;
        let rows = vec![sample_flagged(), anomalous];

        let batch = flagged_batch(&rows).unwrap();
        assert_eq!(FlaggedRecord::from_batch(&batch).unwrap(), rows);
    }

    #[test]
    fn from_batch_reports_missing_column() {
        let batch = raw_batch(&[RawRecord::default()]).unwrap();
        let err = FlaggedRecord::from_batch(&batch).unwrap_err();
        // `id` exists but is text, not Int32.
        assert!(matches!(err, RecordError::Column(c) if c == "id"));
    }

    #[test]
    fn contracted_record_renders_as_parseable_text() {
        let record = ContractedRecord {
            id: Some(3),
            first_name: Some("Unknown".into()),
            last_name: Some("Lee".into()),
            email: None,
            phone: Some(-999_999_999),
            status: "cancelled".into(),
            birth_date: NaiveDate::from_ymd_opt(2001, 12, 9),
            created_at: NaiveDate::from_ymd_opt(2022, 3, 4).and_then(|d| d.and_hms_opt(0, 0, 0)),
        };
        let raw = RawRecord::from(&record);
        assert_eq!(raw.phone.as_deref(), Some("-999999999"));
        assert_eq!(raw.birth_date.as_deref(), Some("2001-12-09"));
        assert_eq!(raw.created_at.as_deref(), Some("2022-03-04T00:00:00"));
        assert_eq!(raw.email, None);
    }
}
