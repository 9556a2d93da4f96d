//! CSV in and out. Input columns are always read as text; typing is the
//! flagger's job.

use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use arrow::compute::concat_batches;
use arrow::csv::reader::Format;
use arrow::csv::{ReaderBuilder, WriterBuilder};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;

/// Header names from the first line, every column typed `Utf8`.
fn text_schema(file: &mut File) -> anyhow::Result<SchemaRef> {
    let (inferred, _) = Format::default()
        .with_header(true)
        .infer_schema(BufReader::new(&mut *file), Some(0))
        .context("reading CSV header")?;
    file.seek(SeekFrom::Start(0))?;
    let fields: Vec<Field> = inferred
        .fields()
        .iter()
        .map(|f| Field::new(f.name(), DataType::Utf8, true))
        .collect();
    Ok(Arc::new(Schema::new(fields)))
}

/// Read a whole CSV file into one all-text batch.
pub fn read_csv(path: &Path) -> anyhow::Result<RecordBatch> {
    let mut file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let schema = text_schema(&mut file)?;
    let reader = ReaderBuilder::new(Arc::clone(&schema))
        .with_header(true)
        .build(file)
        .with_context(|| format!("reading {}", path.display()))?;
    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(concat_batches(&schema, &batches)?)
}

pub fn write_csv(path: &Path, batch: &RecordBatch) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = WriterBuilder::new().with_header(true).build(file);
    writer
        .write(batch)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
