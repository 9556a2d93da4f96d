//! Remediator: apply the imputation policy to a flagged batch and hand back
//! a batch that satisfies the output contract.
//!
//! Categorical and contact fields get configured defaults. Identity and
//! temporal fields never do: a record with a null `id`, `birth_date` or
//! `created_at` is routed out (quarantine) or fails the batch (abort),
//! depending on [`RejectionMode`].

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, Int32Array, Int64Array, StringArray, UInt64Array};
use arrow::compute::{filter, filter_record_batch, is_null, not, or};
use arrow::datatypes::{DataType, Schema};
use arrow::record_batch::RecordBatch;
use remedia_core::field::{self, FieldKind};
use remedia_core::{
    ContractedRecord, FieldPolicy, FlaggedRecord, Imputation, PipelineConfig, RejectionMode, users,
};
use tracing::{debug, warn};

use crate::columns::typed;
use crate::{Contract, PipelineError};

/// How many rejected rows to spell out in an abort message.
const SUMMARY_ROWS: usize = 5;

/// Output of one remediation pass.
///
/// `contracted.num_rows() + rejected.num_rows()` equals the input row
/// count, and both keep input order.
#[derive(Debug, Clone)]
pub struct Remediation {
    pub contracted: RecordBatch,
    /// Flagged rows routed out, with `row_index` and `rejection_reason`.
    pub rejected: RecordBatch,
}

/// A flagged row that could not be contracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRecord {
    pub row_index: usize,
    /// Required fields that were null with no safe default.
    pub fields: Vec<&'static str>,
    pub record: FlaggedRecord,
}

impl RejectedRecord {
    pub fn reason(&self) -> String {
        self.fields.join(",")
    }
}

#[derive(Debug, Clone)]
pub struct Remediator {
    config: Arc<PipelineConfig>,
    policies: Vec<FieldPolicy>,
    contract: Contract,
}

impl Remediator {
    pub fn new(config: Arc<PipelineConfig>) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            policies: config.policies(),
            contract: Contract::new(Arc::clone(&config)),
            config,
        })
    }

    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    /// Remediate a flagged batch.
    ///
    /// Fails only for malformed input, for unresolvable records under
    /// [`RejectionMode::Abort`], or if the result would breach the contract.
    pub fn remediate(&self, flagged: &RecordBatch) -> Result<Remediation, PipelineError> {
        let n = flagged.num_rows();
        let is_anomalous = typed::<BooleanArray>(flagged, field::IS_ANOMALOUS, DataType::Boolean)?;

        let mut candidates: Vec<ArrayRef> = Vec::with_capacity(self.policies.len());
        for policy in &self.policies {
            let name = policy.rule.name;
            let expected = policy.rule.kind.data_type();
            let col = flagged
                .column_by_name(name)
                .ok_or_else(|| PipelineError::MissingColumn(name.to_string()))?;
            if col.data_type() != &expected {
                return Err(PipelineError::ColumnType {
                    column: name.to_string(),
                    expected,
                    actual: col.data_type().clone(),
                });
            }
            let out: ArrayRef = match (policy.rule.kind, &policy.imputation) {
                (FieldKind::Status, _) => {
                    let status = typed::<StringArray>(flagged, name, expected)?;
                    Arc::new(self.remediate_status(status, is_anomalous))
                }
                (_, Some(value)) => impute(name, col, value)?,
                (_, None) => Arc::clone(col),
            };
            candidates.push(out);
        }

        // Required fields with no default: a null here cannot be fixed.
        let mut unresolvable: Vec<(&'static str, BooleanArray)> = Vec::new();
        let mut reject = BooleanArray::from(vec![false; n]);
        for (policy, col) in self.policies.iter().zip(&candidates) {
            if policy.rejects_on_null() {
                let nulls = is_null(col.as_ref())?;
                reject = or(&reject, &nulls)?;
                unresolvable.push((policy.rule.name, nulls));
            }
        }

        let rejected_rows: Vec<usize> = (0..n).filter(|&i| reject.value(i)).collect();
        let reasons: Vec<String> = rejected_rows
            .iter()
            .map(|&i| {
                unresolvable
                    .iter()
                    .filter(|(_, nulls)| nulls.value(i))
                    .map(|(name, _)| *name)
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .collect();

        if !rejected_rows.is_empty() {
            warn!(
                rejected = rejected_rows.len(),
                mode = ?self.config.rejection,
                "records with unresolvable null fields"
            );
            if self.config.rejection == RejectionMode::Abort {
                let summary = summarize(&rejected_rows, &reasons);
                return Err(PipelineError::UnresolvableRecords {
                    rows: rejected_rows,
                    summary,
                });
            }
        }

        let keep = not(&reject)?;
        let columns = candidates
            .iter()
            .map(|c| filter(c.as_ref(), &keep))
            .collect::<Result<Vec<_>, _>>()?;
        let contracted = self.contract.seal(columns)?;
        let rejected = quarantine(flagged, &reject, &rejected_rows, reasons)?;

        debug!(
            rows = n,
            contracted = contracted.num_rows(),
            rejected = rejected.num_rows(),
            "remediated batch"
        );
        Ok(Remediation {
            contracted,
            rejected,
        })
    }

    /// Row-at-a-time reference implementation for a single record.
    ///
    /// Returns the names of the unresolvable fields when the record cannot
    /// be contracted.
    pub fn remediate_record(
        &self,
        record: &FlaggedRecord,
    ) -> Result<ContractedRecord, Vec<&'static str>> {
        let contracted = ContractedRecord {
            id: record.id,
            first_name: self.impute_text(field::FIRST_NAME, &record.first_name),
            last_name: self.impute_text(field::LAST_NAME, &record.last_name),
            email: self.impute_text(field::EMAIL, &record.email),
            phone: record.phone.or(self.config.integer_default(field::PHONE)),
            status: self.final_status(record.is_anomalous, record.status.as_deref()),
            birth_date: record.birth_date,
            created_at: record.created_at,
        };

        let missing: Vec<&'static str> = self
            .policies
            .iter()
            .filter(|p| p.rejects_on_null() && is_null_field(&contracted, p.rule.name))
            .map(|p| p.rule.name)
            .collect();
        if missing.is_empty() {
            Ok(contracted)
        } else {
            Err(missing)
        }
    }

    /// Row-at-a-time reference implementation of [`remediate`](Self::remediate).
    pub fn remediate_records(
        &self,
        records: &[FlaggedRecord],
    ) -> Result<(Vec<ContractedRecord>, Vec<RejectedRecord>), PipelineError> {
        let mut contracted = Vec::with_capacity(records.len());
        let mut rejected = Vec::new();
        for (row_index, record) in records.iter().enumerate() {
            match self.remediate_record(record) {
                Ok(c) => contracted.push(c),
                Err(fields) => rejected.push(RejectedRecord {
                    row_index,
                    fields,
                    record: record.clone(),
                }),
            }
        }
        if self.config.rejection == RejectionMode::Abort && !rejected.is_empty() {
            let rows: Vec<usize> = rejected.iter().map(|r| r.row_index).collect();
            let reasons: Vec<String> = rejected.iter().map(RejectedRecord::reason).collect();
            let summary = summarize(&rows, &reasons);
            return Err(PipelineError::UnresolvableRecords { rows, summary });
        }
        Ok((contracted, rejected))
    }

    // ── Policy rules ──

    fn remediate_status(&self, status: &StringArray, is_anomalous: &BooleanArray) -> StringArray {
        (0..status.len())
            .map(|i| {
                let anomalous = is_anomalous.is_null(i) || is_anomalous.value(i);
                let value = status.is_valid(i).then(|| status.value(i));
                Some(self.final_status(anomalous, value))
            })
            .collect()
    }

    /// The record's status, unless it cannot be trusted.
    fn final_status(&self, anomalous: bool, status: Option<&str>) -> String {
        match status {
            Some(s) if !anomalous && self.config.is_valid_status(s) => s.to_string(),
            _ => self.config.safe_status.clone(),
        }
    }

    fn impute_text(&self, name: &str, value: &Option<String>) -> Option<String> {
        match (value, self.config.text_default(name)) {
            (Some(v), Some(default)) if v.trim().is_empty() => Some(default.to_string()),
            (None, Some(default)) => Some(default.to_string()),
            _ => value.clone(),
        }
    }
}

/// Fill nulls in `col` with `value`. Blank text counts as null.
fn impute(name: &str, col: &ArrayRef, value: &Imputation) -> Result<ArrayRef, PipelineError> {
    let mismatch = || PipelineError::ColumnType {
        column: name.to_string(),
        expected: match value {
            Imputation::Integer(_) => DataType::Int64,
            Imputation::Text(_) => DataType::Utf8,
        },
        actual: col.data_type().clone(),
    };
    let filled: ArrayRef = match value {
        Imputation::Text(default) => {
            let arr = col.as_any().downcast_ref::<StringArray>().ok_or_else(mismatch)?;
            Arc::new(
                arr.iter()
                    .map(|v| match v {
                        Some(s) if !s.trim().is_empty() => Some(s),
                        _ => Some(default.as_str()),
                    })
                    .collect::<StringArray>(),
            )
        }
        Imputation::Integer(default) => {
            if let Some(arr) = col.as_any().downcast_ref::<Int64Array>() {
                Arc::new(arr.iter().map(|v| Some(v.unwrap_or(*default))).collect::<Int64Array>())
            } else if let Some(arr) = col.as_any().downcast_ref::<Int32Array>() {
                let default = i32::try_from(*default).map_err(|_| mismatch())?;
                Arc::new(arr.iter().map(|v| Some(v.unwrap_or(default))).collect::<Int32Array>())
            } else {
                return Err(mismatch());
            }
        }
    };
    Ok(filled)
}

/// Filter the rejected rows out of the flagged batch and tag them.
fn quarantine(
    flagged: &RecordBatch,
    reject: &BooleanArray,
    rows: &[usize],
    reasons: Vec<String>,
) -> Result<RecordBatch, PipelineError> {
    let base = filter_record_batch(flagged, reject)?;
    let mut fields: Vec<_> = base
        .schema()
        .fields()
        .iter()
        .map(|f| f.as_ref().clone())
        .collect();
    fields.extend(users::rejection_fields());

    let mut columns = base.columns().to_vec();
    columns.push(Arc::new(
        rows.iter().map(|&i| i as u64).collect::<UInt64Array>(),
    ));
    columns.push(Arc::new(StringArray::from(reasons)));
    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

fn is_null_field(record: &ContractedRecord, name: &str) -> bool {
    match name {
        field::ID => record.id.is_none(),
        field::FIRST_NAME => record.first_name.is_none(),
        field::LAST_NAME => record.last_name.is_none(),
        field::EMAIL => record.email.is_none(),
        field::PHONE => record.phone.is_none(),
        field::BIRTH_DATE => record.birth_date.is_none(),
        field::CREATED_AT => record.created_at.is_none(),
        _ => false,
    }
}

fn summarize(rows: &[usize], reasons: &[String]) -> String {
    let mut parts: Vec<String> = rows
        .iter()
        .zip(reasons)
        .take(SUMMARY_ROWS)
        .map(|(row, reason)| format!("row {row}: {reason}"))
        .collect();
    if rows.len() > SUMMARY_ROWS {
        parts.push(format!("and {} more", rows.len() - SUMMARY_ROWS));
    }
    parts.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use remedia_core::config::PHONE_SENTINEL;
    use remedia_core::record::flagged_batch;

    fn remediator() -> Remediator {
        Remediator::new(Arc::new(PipelineConfig::default())).unwrap()
    }

    fn valid() -> FlaggedRecord {
        FlaggedRecord {
            id: Some(7),
            first_name: Some("Ann".into()),
            last_name: Some("Lee".into()),
            email: Some("ann@example.com".into()),
            phone: Some(5_551_234),
            status: Some("active".into()),
            birth_date: NaiveDate::from_ymd_opt(1990, 4, 2),
            created_at: NaiveDate::from_ymd_opt(2021, 1, 15).and_then(|d| d.and_hms_opt(0, 0, 0)),
            is_anomalous: false,
            raw_id: Some("7".into()),
            raw_email: Some("ann@example.com".into()),
            raw_phone: Some("5551234".into()),
            raw_birth_date: Some("04/02/1990".into()),
            raw_created_at: Some("01/15/2021".into()),
        }
    }

    #[test]
    fn valid_record_passes_through() {
        let flagged = valid();
        let c = remediator().remediate_record(&flagged).unwrap();
        assert_eq!(c.id, flagged.id);
        assert_eq!(c.first_name, flagged.first_name);
        assert_eq!(c.last_name, flagged.last_name);
        assert_eq!(c.email, flagged.email);
        assert_eq!(c.phone, flagged.phone);
        assert_eq!(Some(c.status), flagged.status);
        assert_eq!(c.birth_date, flagged.birth_date);
        assert_eq!(c.created_at, flagged.created_at);
    }

    #[test]
    fn missing_contact_fields_get_defaults() {
        let flagged = FlaggedRecord {
            first_name: None,
            last_name: Some("  ".into()),
            phone: None,
            is_anomalous: true,
            ..valid()
        };
        let c = remediator().remediate_record(&flagged).unwrap();
        assert_eq!(c.first_name.as_deref(), Some("Unknown"));
        assert_eq!(c.last_name.as_deref(), Some("Unknown"));
        assert_eq!(c.phone, Some(PHONE_SENTINEL));
        assert_eq!(c.status, "cancelled");
    }

    #[test]
    fn anomalous_record_is_cancelled_even_with_valid_status() {
        let flagged = FlaggedRecord {
            is_anomalous: true,
            ..valid()
        };
        assert_eq!(remediator().remediate_record(&flagged).unwrap().status, "cancelled");
    }

    #[test]
    fn out_of_domain_or_null_status_is_cancelled() {
        for status in [Some("XX".to_string()), None] {
            let flagged = FlaggedRecord { status, ..valid() };
            assert_eq!(remediator().remediate_record(&flagged).unwrap().status, "cancelled");
        }
    }

    #[test]
    fn other_valid_statuses_pass_through() {
        let flagged = FlaggedRecord {
            status: Some("pending".into()),
            ..valid()
        };
        assert_eq!(remediator().remediate_record(&flagged).unwrap().status, "pending");
    }

    #[test]
    fn identity_and_dates_are_never_fabricated() {
        let flagged = FlaggedRecord {
            id: None,
            created_at: None,
            is_anomalous: true,
            ..valid()
        };
        let missing = remediator().remediate_record(&flagged).unwrap_err();
        assert_eq!(missing, vec!["id", "created_at"]);
    }

    #[test]
    fn batch_quarantines_unresolvable_rows() {
        let rows = vec![
            valid(),
            FlaggedRecord {
                id: None,
                phone: None,
                is_anomalous: true,
                ..valid()
            },
            FlaggedRecord {
                id: Some(9),
                birth_date: None,
                is_anomalous: true,
                ..valid()
            },
            FlaggedRecord {
                id: Some(10),
                phone: None,
                is_anomalous: true,
                ..valid()
            },
        ];
        let out = remediator().remediate(&flagged_batch(&rows).unwrap()).unwrap();
        assert_eq!(out.contracted.num_rows() + out.rejected.num_rows(), rows.len());
        assert_eq!(out.rejected.num_rows(), 2);

        let row_index = out
            .rejected
            .column_by_name("row_index")
            .unwrap()
            .as_any()
            .downcast_ref::<UInt64Array>()
            .unwrap();
        assert_eq!(row_index.values().to_vec(), vec![1, 2]);
        let reason = out
            .rejected
            .column_by_name("rejection_reason")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(reason.value(0), "id");
        assert_eq!(reason.value(1), "birth_date");

        let contracted = ContractedRecord::from_batch(&out.contracted).unwrap();
        let ids: Vec<Option<i32>> = contracted.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![Some(7), Some(10)]);
        assert_eq!(contracted[1].phone, Some(PHONE_SENTINEL));
        assert_eq!(contracted[1].status, "cancelled");
    }

    #[test]
    fn contracted_batch_has_no_nulls_in_required_columns() {
        let rows = vec![
            FlaggedRecord {
                first_name: None,
                last_name: None,
                phone: None,
                status: None,
                is_anomalous: true,
                ..valid()
            },
            valid(),
        ];
        let out = remediator().remediate(&flagged_batch(&rows).unwrap()).unwrap();
        let schema = out.contracted.schema();
        for (f, col) in schema.fields().iter().zip(out.contracted.columns()) {
            if !f.is_nullable() {
                assert_eq!(col.null_count(), 0, "{}", f.name());
            }
        }
        remediator().contract().verify(&out.contracted).unwrap();
    }

    #[test]
    fn abort_mode_fails_the_batch() {
        let config = PipelineConfig {
            rejection: RejectionMode::Abort,
            ..Default::default()
        };
        let r = Remediator::new(Arc::new(config)).unwrap();
        let rows = vec![
            valid(),
            FlaggedRecord {
                id: None,
                is_anomalous: true,
                ..valid()
            },
        ];
        let err = r.remediate(&flagged_batch(&rows).unwrap()).unwrap_err();
        match err {
            PipelineError::UnresolvableRecords { rows, summary } => {
                assert_eq!(rows, vec![1]);
                assert_eq!(summary, "row 1: id");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(
            r.remediate_records(&rows),
            Err(PipelineError::UnresolvableRecords { .. })
        ));

        // A clean batch is unaffected by the mode.
        let out = r.remediate(&flagged_batch(&[valid()]).unwrap()).unwrap();
        assert_eq!(out.contracted.num_rows(), 1);
        assert_eq!(out.rejected.num_rows(), 0);
    }

    #[test]
    fn columnar_and_row_paths_agree() {
        let rows = vec![
            valid(),
            FlaggedRecord {
                first_name: None,
                phone: None,
                status: Some("XX".into()),
                is_anomalous: true,
                ..valid()
            },
            FlaggedRecord {
                id: None,
                is_anomalous: true,
                ..valid()
            },
            FlaggedRecord {
                email: None,
                status: Some("inactive".into()),
                ..valid()
            },
        ];
        let r = remediator();
        let out = r.remediate(&flagged_batch(&rows).unwrap()).unwrap();
        let (contracted, rejected) = r.remediate_records(&rows).unwrap();
        assert_eq!(ContractedRecord::from_batch(&out.contracted).unwrap(), contracted);
        assert_eq!(rejected.len(), out.rejected.num_rows());
        assert_eq!(rejected[0].row_index, 2);
        assert_eq!(rejected[0].reason(), "id");
        assert_eq!(
            FlaggedRecord::from_batch(&out.rejected).unwrap()[0],
            rejected[0].record
        );
    }

    #[test]
    fn relaxed_contract_lets_missing_dates_through() {
        let config = PipelineConfig {
            required: ["id", "first_name", "last_name", "phone", "status"]
                .map(String::from)
                .to_vec(),
            ..Default::default()
        };
        let r = Remediator::new(Arc::new(config)).unwrap();
        let rows = vec![FlaggedRecord {
            birth_date: None,
            is_anomalous: true,
            ..valid()
        }];
        let out = r.remediate(&flagged_batch(&rows).unwrap()).unwrap();
        assert_eq!(out.contracted.num_rows(), 1);
        assert_eq!(out.rejected.num_rows(), 0);
        assert_eq!(out.contracted.column_by_name("birth_date").unwrap().null_count(), 1);
    }

    #[test]
    fn wrong_flagged_type_is_rejected() {
        let batch = remedia_core::record::raw_batch(&[remedia_core::RawRecord::default()]).unwrap();
        let err = remediator().remediate(&batch).unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn(c) if c == "is_anomalous"));
    }

    #[test]
    fn summary_is_truncated() {
        let rows: Vec<usize> = (0..8).collect();
        let reasons = vec!["id".to_string(); 8];
        let s = summarize(&rows, &reasons);
        assert!(s.starts_with("row 0: id; row 1: id"));
        assert!(s.ends_with("and 3 more"));
    }
}
