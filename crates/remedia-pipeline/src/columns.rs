//! Column lookup helpers shared by the stages.

use arrow::array::{Array, StringArray, new_null_array};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;

use crate::PipelineError;

/// View any raw column as text. Arrow's safe cast renders numbers, dates
/// and timestamps in their canonical text form.
pub(crate) fn text_view(batch: &RecordBatch, name: &str) -> Result<StringArray, PipelineError> {
    let col = batch
        .column_by_name(name)
        .ok_or_else(|| PipelineError::MissingColumn(name.to_string()))?;
    let text = cast(col.as_ref(), &DataType::Utf8)?;
    text.as_any()
        .downcast_ref::<StringArray>()
        .cloned()
        .ok_or_else(|| PipelineError::ColumnType {
            column: name.to_string(),
            expected: DataType::Utf8,
            actual: text.data_type().clone(),
        })
}

/// Like [`text_view`], but an absent column reads as all nulls.
pub(crate) fn optional_text_view(
    batch: &RecordBatch,
    name: &str,
) -> Result<StringArray, PipelineError> {
    if batch.column_by_name(name).is_some() {
        return text_view(batch, name);
    }
    let nulls = new_null_array(&DataType::Utf8, batch.num_rows());
    nulls
        .as_any()
        .downcast_ref::<StringArray>()
        .cloned()
        .ok_or_else(|| PipelineError::MissingColumn(name.to_string()))
}

/// Borrow a column that must already have its typed (flagged) form.
pub(crate) fn typed<'a, T: Array + 'static>(
    batch: &'a RecordBatch,
    name: &str,
    expected: DataType,
) -> Result<&'a T, PipelineError> {
    let col = batch
        .column_by_name(name)
        .ok_or_else(|| PipelineError::MissingColumn(name.to_string()))?;
    col.as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| PipelineError::ColumnType {
            column: name.to_string(),
            expected,
            actual: col.data_type().clone(),
        })
}
