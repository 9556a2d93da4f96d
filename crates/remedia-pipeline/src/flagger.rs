//! Validator/flagger: cast raw columns to their typed form and flag
//! anomalous records without discarding or imputing anything.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Date32Array, Int32Array, Int64Array, StringArray,
    TimestampMicrosecondArray,
};
use arrow::compute::{is_null, or};
use arrow::record_batch::RecordBatch;
use chrono::{NaiveDate, NaiveDateTime};
use remedia_core::field::{self, FieldKind, USER_FIELDS};
use remedia_core::normalize::{
    age_at_creation, date_to_days, is_valid_email, normalize_email, normalize_name,
    normalize_status, parse_date, parse_integer, parse_timestamp, timestamp_to_micros,
};
use remedia_core::{FlaggedRecord, PipelineConfig, RawRecord, users};
use tracing::debug;

use crate::PipelineError;
use crate::columns::{optional_text_view, text_view};

/// First pipeline stage.
///
/// Produces exactly one flagged row per raw row, in order. A record is
/// anomalous iff any cast field failed to parse or its status is outside
/// the valid set (plus the enrollment checks when `enrollment.strict` is
/// set).
#[derive(Debug, Clone)]
pub struct Flagger {
    config: Arc<PipelineConfig>,
}

impl Flagger {
    pub fn new(config: Arc<PipelineConfig>) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Flag a raw batch.
    ///
    /// Raw columns may be of any Arrow type; each is viewed as text before
    /// parsing. The `email` column is optional. Extra columns are ignored.
    pub fn flag(&self, raw: &RecordBatch) -> Result<RecordBatch, PipelineError> {
        let texts = USER_FIELDS
            .iter()
            .map(|rule| match rule.kind {
                FieldKind::Email => optional_text_view(raw, rule.name),
                _ => text_view(raw, rule.name),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut columns: Vec<ArrayRef> = Vec::with_capacity(USER_FIELDS.len() + 5);
        let mut anomalous = BooleanArray::from(vec![false; raw.num_rows()]);
        for (rule, text) in USER_FIELDS.iter().zip(&texts) {
            let typed = self.parse_column(rule.kind, text);
            let failed = match rule.kind {
                FieldKind::Status => Some(self.status_failures(text)),
                kind if kind.null_is_anomaly() => Some(is_null(typed.as_ref())?),
                _ => None,
            };
            if let Some(failed) = failed {
                anomalous = or(&anomalous, &failed)?;
            }
            columns.push(typed);
        }

        if self.config.enrollment.strict {
            anomalous = or(&anomalous, &self.enrollment_failures(&columns)?)?;
        }
        let anomalous_count = anomalous.true_count();
        columns.push(Arc::new(anomalous));

        for (rule, text) in USER_FIELDS.iter().zip(texts) {
            if rule.raw_column.is_some() {
                columns.push(Arc::new(text));
            }
        }

        let batch = RecordBatch::try_new(Arc::new(users::flagged_schema()), columns)?;
        debug!(rows = batch.num_rows(), anomalous = anomalous_count, "flagged batch");
        Ok(batch)
    }

    /// Row-at-a-time reference implementation of [`flag`](Self::flag).
    pub fn flag_record(&self, raw: &RawRecord) -> FlaggedRecord {
        let id = parse_integer::<i32>(raw.id.as_deref());
        let phone = parse_integer::<i64>(raw.phone.as_deref());
        let birth_date = self.parse_date(raw.birth_date.as_deref());
        let created_at = self.parse_timestamp(raw.created_at.as_deref());
        let email = normalize_email(raw.email.as_deref());

        let mut is_anomalous = id.is_none()
            || phone.is_none()
            || birth_date.is_none()
            || created_at.is_none()
            || !self.status_in_domain(raw.status.as_deref());
        if self.config.enrollment.strict {
            is_anomalous |= self.violates_enrollment(email.as_deref(), birth_date, created_at);
        }

        FlaggedRecord {
            id,
            first_name: normalize_name(raw.first_name.as_deref()),
            last_name: normalize_name(raw.last_name.as_deref()),
            email,
            phone,
            status: self.flagged_status(raw.status.as_deref()),
            birth_date,
            created_at,
            is_anomalous,
            raw_id: raw.id.clone(),
            raw_email: raw.email.clone(),
            raw_phone: raw.phone.clone(),
            raw_birth_date: raw.birth_date.clone(),
            raw_created_at: raw.created_at.clone(),
        }
    }

    // ── Per-kind column parsers ──

    fn parse_column(&self, kind: FieldKind, text: &StringArray) -> ArrayRef {
        match kind {
            FieldKind::Int32 => Arc::new(
                text.iter()
                    .map(parse_integer::<i32>)
                    .collect::<Int32Array>(),
            ),
            FieldKind::Int64 => Arc::new(
                text.iter()
                    .map(parse_integer::<i64>)
                    .collect::<Int64Array>(),
            ),
            FieldKind::Date => Arc::new(
                text.iter()
                    .map(|v| self.parse_date(v).map(date_to_days))
                    .collect::<Date32Array>(),
            ),
            FieldKind::Timestamp => Arc::new(
                text.iter()
                    .map(|v| self.parse_timestamp(v).map(timestamp_to_micros))
                    .collect::<TimestampMicrosecondArray>(),
            ),
            FieldKind::Name => Arc::new(text.iter().map(normalize_name).collect::<StringArray>()),
            FieldKind::Email => Arc::new(text.iter().map(normalize_email).collect::<StringArray>()),
            FieldKind::Status => Arc::new(
                text.iter()
                    .map(|v| self.flagged_status(v))
                    .collect::<StringArray>(),
            ),
        }
    }

    fn status_failures(&self, text: &StringArray) -> BooleanArray {
        text.iter()
            .map(|v| Some(!self.status_in_domain(v)))
            .collect()
    }

    fn enrollment_failures(&self, columns: &[ArrayRef]) -> Result<BooleanArray, PipelineError> {
        let email = find::<StringArray>(columns, field::EMAIL)?;
        let birth_date = find::<Date32Array>(columns, field::BIRTH_DATE)?;
        let created_at = find::<TimestampMicrosecondArray>(columns, field::CREATED_AT)?;
        Ok((0..email.len())
            .map(|i| {
                let email = email.is_valid(i).then(|| email.value(i));
                let birth = birth_date
                    .is_valid(i)
                    .then(|| birth_date.value_as_date(i))
                    .flatten();
                let created = created_at
                    .is_valid(i)
                    .then(|| created_at.value_as_datetime(i))
                    .flatten();
                Some(self.violates_enrollment(email, birth, created))
            })
            .collect())
    }

    // ── Scalar rules shared by both paths ──

    fn parse_date(&self, raw: Option<&str>) -> Option<NaiveDate> {
        parse_date(raw, &self.config.date_formats)
    }

    fn parse_timestamp(&self, raw: Option<&str>) -> Option<NaiveDateTime> {
        parse_timestamp(raw, &self.config.timestamp_formats, &self.config.date_formats)
    }

    fn status_in_domain(&self, raw: Option<&str>) -> bool {
        normalize_status(raw).is_some_and(|s| self.config.is_valid_status(&s))
    }

    /// Canonical token when valid; the original value otherwise.
    fn flagged_status(&self, raw: Option<&str>) -> Option<String> {
        match normalize_status(raw) {
            Some(s) if self.config.is_valid_status(&s) => Some(s),
            _ => raw.map(str::to_string),
        }
    }

    fn violates_enrollment(
        &self,
        email: Option<&str>,
        birth_date: Option<NaiveDate>,
        created_at: Option<NaiveDateTime>,
    ) -> bool {
        let under_age = match (birth_date, created_at) {
            (Some(b), Some(c)) => age_at_creation(b, c) < self.config.enrollment.min_age,
            _ => true,
        };
        under_age || !is_valid_email(email)
    }
}

fn find<'a, T: Array + 'static>(columns: &'a [ArrayRef], name: &str) -> Result<&'a T, PipelineError> {
    USER_FIELDS
        .iter()
        .position(|r| r.name == name)
        .and_then(|i| columns.get(i))
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| PipelineError::MissingColumn(name.to_string()))
}
