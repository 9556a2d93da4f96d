//! Both stages wired together over one config.

use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use rayon::prelude::*;
use remedia_core::PipelineConfig;
use tracing::info;

use crate::{AnomalyLog, Flagger, PipelineError, Remediator};

/// Everything one run produces for a raw batch.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub flagged: RecordBatch,
    pub contracted: RecordBatch,
    pub rejected: RecordBatch,
    pub anomalies: RecordBatch,
}

/// Row counts for one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSummary {
    pub rows: usize,
    pub anomalous: usize,
    pub contracted: usize,
    pub rejected: usize,
}

impl PipelineOutput {
    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            rows: self.flagged.num_rows(),
            anomalous: self.anomalies.num_rows(),
            contracted: self.contracted.num_rows(),
            rejected: self.rejected.num_rows(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    flagger: Flagger,
    remediator: Remediator,
    anomaly_log: AnomalyLog,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        let config = Arc::new(config);
        Ok(Self {
            flagger: Flagger::new(Arc::clone(&config))?,
            remediator: Remediator::new(Arc::clone(&config))?,
            anomaly_log: AnomalyLog::new(Arc::clone(&config)),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn flagger(&self) -> &Flagger {
        &self.flagger
    }

    pub fn remediator(&self) -> &Remediator {
        &self.remediator
    }

    /// Flag, remediate and log one raw batch.
    pub fn run(&self, raw: &RecordBatch) -> Result<PipelineOutput, PipelineError> {
        let flagged = self.flagger.flag(raw)?;
        let anomalies = self.anomaly_log.build(&flagged)?;
        let remediation = self.remediator.remediate(&flagged)?;
        let output = PipelineOutput {
            flagged,
            contracted: remediation.contracted,
            rejected: remediation.rejected,
            anomalies,
        };

        let s = output.summary();
        info!(
            rows = s.rows,
            anomalous = s.anomalous,
            contracted = s.contracted,
            rejected = s.rejected,
            "pipeline run complete"
        );
        Ok(output)
    }

    /// Run independent batches in parallel. Results come back in input
    /// order; one failing batch does not affect the others.
    pub fn run_batches(&self, batches: &[RecordBatch]) -> Vec<Result<PipelineOutput, PipelineError>> {
        batches.par_iter().map(|b| self.run(b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Int64Array, StringArray, UInt64Array};
    use remedia_core::config::PHONE_SENTINEL;
    use remedia_core::record::raw_batch;
    use remedia_core::{ContractedRecord, RawRecord, RejectionMode, field};

    fn record(id: Option<&str>, phone: &str, first_name: Option<&str>, status: &str) -> RawRecord {
        RawRecord {
            id: id.map(Into::into),
            first_name: first_name.map(Into::into),
            last_name: Some("Lee".into()),
            email: Some("ann@example.com".into()),
            phone: Some(phone.into()),
            status: Some(status.into()),
            birth_date: Some("04/02/1990".into()),
            created_at: Some("01/15/2021".into()),
        }
    }

    fn mixed() -> Vec<RawRecord> {
        vec![
            record(Some("7"), "5551234", Some("Ann"), "active"),
            record(Some("12a"), "555-1234", None, "XX"),
            record(Some("8"), "555-0008", Some("bob"), "pending"),
            record(Some("9"), "5550009", Some("cy"), " Inactive "),
            record(Some("10"), "5550010", Some("di"), "archived"),
        ]
    }

    fn pipeline() -> Pipeline {
        Pipeline::new(PipelineConfig::default()).unwrap()
    }

    fn strings(batch: &RecordBatch, name: &str) -> Vec<Option<String>> {
        let arr = batch
            .column_by_name(name)
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        arr.iter().map(|v| v.map(str::to_string)).collect()
    }

    #[test]
    fn scenario_invalid_identity_is_rejected_not_fabricated() {
        let p = pipeline();
        let raw = raw_batch(&[record(Some("12a"), "555-1234", None, "XX")]).unwrap();
        let out = p.run(&raw).unwrap();

        let flagged = remedia_core::FlaggedRecord::from_batch(&out.flagged).unwrap();
        assert_eq!(flagged[0].id, None);
        assert_eq!(flagged[0].phone, None);
        assert_eq!(flagged[0].first_name, None);
        assert_eq!(flagged[0].status.as_deref(), Some("XX"));
        assert!(flagged[0].is_anomalous);

        assert_eq!(out.contracted.num_rows(), 0);
        assert_eq!(out.rejected.num_rows(), 1);
        assert_eq!(
            strings(&out.rejected, field::REJECTION_REASON),
            vec![Some("id".to_string())]
        );

        // What the row looks like after imputation, apart from the id.
        let imputed = p.remediator().remediate_record(&flagged[0]);
        assert_eq!(imputed, Err(vec![field::ID]));
        let mut patched = flagged[0].clone();
        patched.id = Some(0);
        let imputed = p.remediator().remediate_record(&patched).unwrap();
        assert_eq!(imputed.phone, Some(PHONE_SENTINEL));
        assert_eq!(imputed.first_name.as_deref(), Some("Unknown"));
        assert_eq!(imputed.status, "cancelled");
    }

    #[test]
    fn scenario_valid_record_passes_through() {
        let p = pipeline();
        let raw = raw_batch(&[record(Some("7"), "5551234", Some("Ann"), "active")]).unwrap();
        let out = p.run(&raw).unwrap();

        let flagged = remedia_core::FlaggedRecord::from_batch(&out.flagged).unwrap();
        assert!(!flagged[0].is_anomalous);
        let contracted = ContractedRecord::from_batch(&out.contracted).unwrap();
        assert_eq!(contracted.len(), 1);
        let c = &contracted[0];
        assert_eq!(c.id, flagged[0].id);
        assert_eq!(c.first_name, flagged[0].first_name);
        assert_eq!(c.last_name, flagged[0].last_name);
        assert_eq!(c.email, flagged[0].email);
        assert_eq!(c.phone, flagged[0].phone);
        assert_eq!(Some(c.status.clone()), flagged[0].status);
        assert_eq!(c.birth_date, flagged[0].birth_date);
        assert_eq!(c.created_at, flagged[0].created_at);
        assert_eq!(out.anomalies.num_rows(), 0);
    }

    #[test]
    fn every_row_is_accounted_for_in_order() {
        let out = pipeline().run(&raw_batch(&mixed()).unwrap()).unwrap();
        let s = out.summary();
        assert_eq!(
            s,
            BatchSummary {
                rows: 5,
                anomalous: 3,
                contracted: 4,
                rejected: 1,
            }
        );
        assert_eq!(s.contracted + s.rejected, s.rows);

        let ids: Vec<_> = ContractedRecord::from_batch(&out.contracted)
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![Some(7), Some(8), Some(9), Some(10)]);
        let rejected_at = out
            .rejected
            .column_by_name(field::ROW_INDEX)
            .unwrap()
            .as_any()
            .downcast_ref::<UInt64Array>()
            .unwrap();
        assert_eq!(rejected_at.values().to_vec(), vec![1]);
    }

    #[test]
    fn anomalous_rows_are_cancelled_with_phone_sentinel() {
        let out = pipeline().run(&raw_batch(&mixed()).unwrap()).unwrap();
        assert_eq!(
            strings(&out.contracted, field::STATUS),
            vec![
                Some("active".to_string()),
                Some("cancelled".to_string()),
                Some("inactive".to_string()),
                Some("cancelled".to_string()),
            ]
        );
        let phone = out
            .contracted
            .column_by_name(field::PHONE)
            .unwrap()
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(phone.null_count(), 0);
        assert_eq!(phone.value(1), PHONE_SENTINEL);
        assert_eq!(phone.value(3), 5_550_010);
        contract_holds(&out);
    }

    fn contract_holds(out: &PipelineOutput) {
        pipeline().remediator().contract().verify(&out.contracted).unwrap();
    }

    fn edge_rows() -> Vec<RawRecord> {
        let mut precise = record(Some("20"), "5550020", Some("ßen"), "active");
        precise.created_at = Some("2021-06-01 13:05:09.123456789".into());
        let mut dotted = record(Some("21"), "5550021", Some("aİb ǆemal"), "active");
        dotted.email = Some("  ann@example.com ".into());
        let mut rows = mixed();
        rows.extend([precise, dotted]);
        rows
    }

    #[test]
    fn contracted_batch_is_a_fixed_point() {
        let p = pipeline();
        let first = p.run(&raw_batch(&edge_rows()).unwrap()).unwrap();
        let second = p.run(&first.contracted).unwrap();
        assert_eq!(second.contracted, first.contracted);
        assert_eq!(second.summary().anomalous, 0);
        assert_eq!(second.summary().rejected, 0);
    }

    #[test]
    fn contracted_record_is_a_fixed_point() {
        let p = pipeline();
        for raw in edge_rows() {
            let flagged = p.flagger().flag_record(&raw);
            let Ok(contracted) = p.remediator().remediate_record(&flagged) else {
                continue;
            };
            let again = p.flagger().flag_record(&RawRecord::from(&contracted));
            assert!(!again.is_anomalous);
            assert_eq!(p.remediator().remediate_record(&again), Ok(contracted));
        }
    }

    #[test]
    fn columnar_and_row_paths_agree() {
        let p = pipeline();
        let rows = mixed();
        let out = p.run(&raw_batch(&rows).unwrap()).unwrap();

        let flagged: Vec<_> = rows.iter().map(|r| p.flagger().flag_record(r)).collect();
        let (contracted, rejected) = p.remediator().remediate_records(&flagged).unwrap();
        assert_eq!(ContractedRecord::from_batch(&out.contracted).unwrap(), contracted);
        assert_eq!(rejected.len(), out.rejected.num_rows());
        assert_eq!(rejected[0].row_index, 1);
    }

    #[test]
    fn abort_mode_fails_the_batch() {
        let config = PipelineConfig {
            rejection: RejectionMode::Abort,
            ..PipelineConfig::default()
        };
        let p = Pipeline::new(config).unwrap();
        let err = p.run(&raw_batch(&mixed()).unwrap()).unwrap_err();
        assert!(matches!(err, PipelineError::UnresolvableRecords { rows, .. } if rows == vec![1]));
    }

    #[test]
    fn batches_run_in_parallel_keep_their_order() {
        let p = pipeline();
        let batches: Vec<RecordBatch> = (0..8)
            .map(|n| {
                let rows: Vec<RawRecord> = (0..=n)
                    .map(|i| {
                        let id = (n * 100 + i).to_string();
                        record(Some(&id), "5550000", Some("ann"), "active")
                    })
                    .collect();
                raw_batch(&rows).unwrap()
            })
            .collect();

        let results = p.run_batches(&batches);
        assert_eq!(results.len(), 8);
        for (n, result) in results.into_iter().enumerate() {
            let out = result.unwrap();
            assert_eq!(out.summary().rows, n + 1);
            let first = ContractedRecord::from_batch(&out.contracted).unwrap()[0].id;
            assert_eq!(first, Some(n as i32 * 100));
        }
    }

    #[test]
    fn invalid_config_is_refused() {
        let config = PipelineConfig {
            safe_status: "archived".into(),
            ..PipelineConfig::default()
        };
        assert!(matches!(
            Pipeline::new(config),
            Err(PipelineError::Config(_))
        ));
    }
}
