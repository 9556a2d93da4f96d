//! Runtime check of the remediator's post-condition.
//!
//! The downstream schema layer aborts a write on any nullability or type
//! violation. [`Contract`] performs the same checks in-process, plus the
//! status domain, so a non-conforming batch never leaves the pipeline.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, StringArray};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use remedia_core::{PipelineConfig, field, users};

use crate::PipelineError;

#[derive(Debug, Clone)]
pub struct Contract {
    schema: SchemaRef,
    config: Arc<PipelineConfig>,
}

impl Contract {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        let schema = Arc::new(users::contracted_schema(&config));
        Self { schema, config }
    }

    pub fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    /// Check a batch produced elsewhere. Columns are matched by name.
    pub fn verify(&self, batch: &RecordBatch) -> Result<(), PipelineError> {
        let columns = self
            .schema
            .fields()
            .iter()
            .map(|f| {
                batch
                    .column_by_name(f.name())
                    .cloned()
                    .ok_or_else(|| breach(f.name(), "column missing"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.verify_columns(&columns)
    }

    /// Check candidate columns (in contracted order) and assemble the
    /// contracted batch.
    pub fn seal(&self, columns: Vec<ArrayRef>) -> Result<RecordBatch, PipelineError> {
        self.verify_columns(&columns)?;
        Ok(RecordBatch::try_new(self.schema(), columns)?)
    }

    fn verify_columns(&self, columns: &[ArrayRef]) -> Result<(), PipelineError> {
        let fields = self.schema.fields();
        if columns.len() != fields.len() {
            return Err(breach(
                "*",
                &format!("expected {} columns, got {}", fields.len(), columns.len()),
            ));
        }

        for (f, col) in fields.iter().zip(columns) {
            if col.data_type() != f.data_type() {
                return Err(breach(
                    f.name(),
                    &format!("type {}, expected {}", col.data_type(), f.data_type()),
                ));
            }
            if !f.is_nullable() && col.null_count() > 0 {
                return Err(breach(
                    f.name(),
                    &format!("{} null value(s) in NOT NULL column", col.null_count()),
                ));
            }
        }

        let status_idx = self.schema.index_of(field::STATUS)?;
        let status = columns[status_idx]
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| breach(field::STATUS, "not a string column"))?;
        if let Some(bad) = status.iter().flatten().find(|s| !self.config.is_valid_status(s)) {
            return Err(breach(
                field::STATUS,
                &format!("value '{bad}' outside the valid status set"),
            ));
        }
        Ok(())
    }
}

fn breach(column: &str, detail: &str) -> PipelineError {
    PipelineError::ContractBreach {
        column: column.to_string(),
        detail: detail.to_string(),
    }
}
