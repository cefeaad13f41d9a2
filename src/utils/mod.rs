//! Utility functions shared across pipeline stages.

use std::fs::File;
use std::path::Path;

use arrow::array::{Float64Array, Int32Array, StringArray};
use arrow::compute::concat_batches;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use crate::error::{PipelineError, Result};

/// Validates that a directory exists and is a directory
///
/// # Errors
/// Returns an error if the directory does not exist or is not a directory
pub fn validate_directory(dir: &Path) -> Result<()> {
    if !dir.exists() || !dir.is_dir() {
        return Err(PipelineError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Directory does not exist: {}", dir.display()),
        )));
    }
    Ok(())
}

/// Log an operation start with consistent format
pub fn log_operation_start(operation: &str, path: &Path) {
    log::info!("{} {}", operation, path.display());
}

/// Log an operation completion with consistent format
pub fn log_operation_complete(
    operation: &str,
    path: &Path,
    items: usize,
    elapsed: Option<std::time::Duration>,
) {
    if let Some(duration) = elapsed {
        log::info!(
            "Successfully {} {} rows from {} in {:?}",
            operation,
            items,
            path.display(),
            duration
        );
    } else {
        log::info!(
            "Successfully {} {} rows from {}",
            operation,
            items,
            path.display()
        );
    }
}

/// Log an operation warning with consistent format
pub fn log_warning(message: &str, path: Option<&Path>) {
    if let Some(path) = path {
        log::warn!("{}: {}", message, path.display());
    } else {
        log::warn!("{message}");
    }
}

/// Look up a string column by name in a record batch
///
/// # Errors
/// Returns a schema error if the column is absent or not a string array
pub fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| PipelineError::Schema(format!("Column {name} not found")))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| PipelineError::Schema(format!("Column {name} is not a string array")))
}

/// Look up a float column by name in a record batch
///
/// # Errors
/// Returns a schema error if the column is absent or not a Float64 array
pub fn float_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Float64Array> {
    batch
        .column_by_name(name)
        .ok_or_else(|| PipelineError::Schema(format!("Column {name} not found")))?
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| PipelineError::Schema(format!("Column {name} is not a Float64 array")))
}

/// Look up an Int32 column by name in a record batch
///
/// # Errors
/// Returns a schema error if the column is absent or not an Int32 array
pub fn int_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int32Array> {
    batch
        .column_by_name(name)
        .ok_or_else(|| PipelineError::Schema(format!("Column {name} not found")))?
        .as_any()
        .downcast_ref::<Int32Array>()
        .ok_or_else(|| PipelineError::Schema(format!("Column {name} is not an Int32 array")))
}

/// Write a record batch to a Parquet file
///
/// # Errors
/// Returns an error if the file cannot be created or the write fails
pub fn write_parquet(batch: &RecordBatch, path: &Path) -> Result<()> {
    let start = std::time::Instant::now();
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
    writer.write(batch)?;
    writer.close()?;
    log_operation_complete("wrote", path, batch.num_rows(), Some(start.elapsed()));
    Ok(())
}

/// Read a Parquet file into a single record batch
///
/// # Errors
/// Returns an error if the file cannot be opened or is not valid Parquet
pub fn read_parquet(path: &Path) -> Result<RecordBatch> {
    let start = std::time::Instant::now();
    log_operation_start("Reading parquet file", path);
    let file = File::open(path).map_err(|e| {
        PipelineError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Failed to open file {}: {}", path.display(), e),
        ))
    })?;

    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    if batches.is_empty() {
        return Err(PipelineError::Ingest(format!(
            "Parquet file {} contains no record batches",
            path.display()
        )));
    }

    let schema = batches[0].schema();
    let combined = concat_batches(&schema, &batches)?;
    log_operation_complete("read", path, combined.num_rows(), Some(start.elapsed()));
    Ok(combined)
}
