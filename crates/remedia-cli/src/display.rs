//! Terminal rendering for pipeline output.

use arrow::array::{Array, UInt64Array};
use arrow::datatypes::Schema;
use arrow::record_batch::RecordBatch;
use arrow::util::display::{ArrayFormatter, FormatOptions};
use arrow::util::pretty::pretty_format_batches;
use remedia_core::field;
use remedia_pipeline::BatchSummary;

pub fn print_table(title: &str, batch: &RecordBatch) -> anyhow::Result<()> {
    println!("=== {title} ({} rows) ===", batch.num_rows());
    if batch.num_rows() > 0 {
        println!("{}", pretty_format_batches(std::slice::from_ref(batch))?);
    }
    println!();
    Ok(())
}

/// One vertical card per rejected record: the reason first, then every
/// non-null column.
pub fn print_rejected_cards(rejected: &RecordBatch) -> anyhow::Result<()> {
    let schema = rejected.schema();
    let options = FormatOptions::default().with_null("");
    let formatters = rejected
        .columns()
        .iter()
        .map(|c| ArrayFormatter::try_new(c.as_ref(), &options))
        .collect::<Result<Vec<_>, _>>()?;
    let row_index = rejected
        .column_by_name(field::ROW_INDEX)
        .and_then(|c| c.as_any().downcast_ref::<UInt64Array>());
    let reason = schema.index_of(field::REJECTION_REASON).ok();

    for row in 0..rejected.num_rows() {
        match row_index {
            Some(idx) => println!("=== rejected row {} ===", idx.value(row)),
            None => println!("=== rejected ==="),
        }
        if let Some(r) = reason {
            println!("  {:<18} {}", "reason", formatters[r].value(row));
        }
        for (i, f) in schema.fields().iter().enumerate() {
            let name = f.name().as_str();
            if name == field::ROW_INDEX
                || name == field::REJECTION_REASON
                || rejected.column(i).is_null(row)
            {
                continue;
            }
            println!("  {:<18} {}", name, formatters[i].value(row));
        }
        println!();
    }
    Ok(())
}

pub fn print_schema(schema: &Schema) {
    for f in schema.fields() {
        let null = if f.is_nullable() { "" } else { "NOT NULL" };
        println!("  {:<12} {:<24} {null}", f.name(), f.data_type().to_string());
    }
}

pub fn print_summary(s: &BatchSummary) {
    eprintln!(
        "  {} rows: {} anomalous, {} contracted, {} rejected",
        s.rows, s.anomalous, s.contracted, s.rejected
    );
}
