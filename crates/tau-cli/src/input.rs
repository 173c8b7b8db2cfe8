//! Parquet ntuple -> [`EventTable`].
//!
//! Every column must be numeric or boolean; values are widened to `f64`
//! (`true` = 1). Nulls become NaN so the engine reports them as malformed
//! the first time a predicate or fill reads them.

use anyhow::{Context, Result};
use arrow::array::AsArray;
use arrow::datatypes::{DataType, Float64Type, Schema as ArrowSchema};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::fs::File;
use std::path::Path;

use tau_core::{EventTable, Schema};

fn open(path: &Path) -> Result<ParquetRecordBatchReaderBuilder<File>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("failed to read Parquet metadata from {}", path.display()))
}

fn schema_of(arrow: &ArrowSchema, path: &Path) -> Result<Schema> {
    for f in arrow.fields() {
        let dt = f.data_type();
        if !(dt.is_numeric() || *dt == DataType::Boolean) {
            anyhow::bail!("{}: column '{}' has unsupported type {dt:?}", path.display(), f.name());
        }
    }
    Ok(Schema::new(arrow.fields().iter().map(|f| f.name().clone()))?)
}

/// Column names of a Parquet file, without reading any rows.
pub fn read_schema(path: &Path) -> Result<Schema> {
    let builder = open(path)?;
    schema_of(builder.schema(), path)
}

/// Read a whole Parquet file into memory.
pub fn read_event_table(path: &Path) -> Result<EventTable> {
    let builder = open(path)?;
    let schema = schema_of(builder.schema(), path)?;
    let reader = builder.build().context("failed to build Parquet reader")?;

    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); schema.len()];
    for batch in reader {
        let batch = batch.with_context(|| format!("failed to read a record batch from {}", path.display()))?;
        for (col, array) in columns.iter_mut().zip(batch.columns()) {
            let widened = arrow::compute::cast(array, &DataType::Float64)?;
            col.extend(widened.as_primitive::<Float64Type>().iter().map(|v| v.unwrap_or(f64::NAN)));
        }
    }
    tracing::info!(path = %path.display(), rows = columns.first().map_or(0, Vec::len), "ntuple loaded");
    Ok(EventTable::from_columns(schema, &columns)?)
}
