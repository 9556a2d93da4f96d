//! Audit log of anomalous records.
//!
//! One row per flagged-anomalous record, with each individual reason broken
//! out so source issues can be diagnosed, and the action taken on the row.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Date32Array, Int32Array, StringArray,
    TimestampMicrosecondArray, UInt64Array,
};
use arrow::compute::{filter_record_batch, is_null};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use remedia_core::field::{self, FieldKind};
use remedia_core::normalize::{age_at_creation, is_valid_email, normalize_status};
use remedia_core::{PipelineConfig, RejectionMode, users};

use crate::PipelineError;
use crate::columns::typed;

#[derive(Debug, Clone)]
pub struct AnomalyLog {
    config: Arc<PipelineConfig>,
}

impl AnomalyLog {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self { config }
    }

    /// Build the log for a flagged batch.
    pub fn build(&self, flagged: &RecordBatch) -> Result<RecordBatch, PipelineError> {
        let n = flagged.num_rows();
        let id = typed::<Int32Array>(flagged, field::ID, FieldKind::Int32.data_type())?;
        let email = typed::<StringArray>(flagged, field::EMAIL, DataType::Utf8)?;
        let status = typed::<StringArray>(flagged, field::STATUS, DataType::Utf8)?;
        let birth_date = typed::<Date32Array>(flagged, field::BIRTH_DATE, DataType::Date32)?;
        let created_at = typed::<TimestampMicrosecondArray>(
            flagged,
            field::CREATED_AT,
            FieldKind::Timestamp.data_type(),
        )?;
        let is_anomalous = typed::<BooleanArray>(flagged, field::IS_ANOMALOUS, DataType::Boolean)?;
        let raw_email = typed::<StringArray>(flagged, "raw_email", DataType::Utf8)?;
        let raw_phone = typed::<StringArray>(flagged, "raw_phone", DataType::Utf8)?;
        let phone = flagged
            .column_by_name(field::PHONE)
            .ok_or_else(|| PipelineError::MissingColumn(field::PHONE.to_string()))?;

        let status_invalid: BooleanArray = status
            .iter()
            .map(|v| Some(!normalize_status(v).is_some_and(|s| self.config.is_valid_status(&s))))
            .collect();
        let email_invalid: BooleanArray = email.iter().map(|v| Some(!is_valid_email(v))).collect();
        let age_invalid: BooleanArray = (0..n)
            .map(|i| {
                let birth = birth_date.is_valid(i).then(|| birth_date.value_as_date(i)).flatten();
                let created = created_at
                    .is_valid(i)
                    .then(|| created_at.value_as_datetime(i))
                    .flatten();
                Some(match (birth, created) {
                    (Some(b), Some(c)) => age_at_creation(b, c) < self.config.enrollment.min_age,
                    _ => true,
                })
            })
            .collect();
        let rejecting: Vec<&'static str> = self
            .config
            .policies()
            .iter()
            .filter(|p| p.rejects_on_null())
            .map(|p| p.rule.name)
            .collect();
        let actions: StringArray = (0..n)
            .map(|i| Some(self.action(flagged, &rejecting, i)))
            .collect();

        let columns: Vec<ArrayRef> = vec![
            Arc::new((0..n as u64).collect::<UInt64Array>()),
            Arc::new(id.clone()),
            Arc::new(created_at.clone()),
            Arc::new(actions),
            Arc::new(is_null(id)?),
            Arc::new(is_null(phone.as_ref())?),
            Arc::new(is_null(birth_date)?),
            Arc::new(is_null(created_at)?),
            Arc::new(status_invalid),
            Arc::new(email_invalid),
            Arc::new(age_invalid),
            Arc::new(raw_email.clone()),
            Arc::new(raw_phone.clone()),
        ];
        let all = RecordBatch::try_new(Arc::new(users::anomaly_log_schema()), columns)?;
        Ok(filter_record_batch(&all, is_anomalous)?)
    }

    /// What the remediator does with row `i`.
    fn action(&self, flagged: &RecordBatch, rejecting: &[&'static str], i: usize) -> String {
        let unresolvable: Vec<&str> = rejecting
            .iter()
            .copied()
            .filter(|name| flagged.column_by_name(name).is_some_and(|c| c.is_null(i)))
            .collect();
        if unresolvable.is_empty() {
            return format!(
                "status changed to '{}' due to validation failure",
                self.config.safe_status
            );
        }
        let fields = unresolvable.join(", ");
        match self.config.rejection {
            RejectionMode::Quarantine => format!("rejected: no safe default for {fields}"),
            RejectionMode::Abort => format!("batch aborted: no safe default for {fields}"),
        }
    }
}
