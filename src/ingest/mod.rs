//! Ingestion of raw HOA dump files.
//!
//! The raw dumps arrive as pipe-delimited text in a legacy Windows-1252
//! encoding, usually gzip-compressed. Ingestion decompresses each archive,
//! decodes the text, parses it into an all-string Arrow batch and
//! concatenates the per-file batches into one wide table.

use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::compute::concat_batches;
use arrow::csv::ReaderBuilder;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use encoding_rs::WINDOWS_1252;
use flate2::read::GzDecoder;
use indicatif::ProgressBar;
use itertools::Itertools;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::utils::{log_operation_start, log_warning, validate_directory};

/// Decompress every `<prefix>*.gz` archive in `dir` next to itself
///
/// A failing archive is logged and skipped so the remaining dumps still get
/// ingested. Returns the number of archives successfully decompressed.
///
/// # Errors
/// Returns an error only if the directory itself cannot be read
pub fn decompress_archives(dir: &Path, prefix: &str) -> Result<usize> {
    validate_directory(dir)?;
    let archives = list_files(dir, prefix, "gz")?;

    let progress = ProgressBar::new(archives.len() as u64);
    let mut decompressed = 0;
    for path in &archives {
        progress.set_message(path.display().to_string());
        match decompress_archive(path) {
            Ok(target) => {
                log::debug!("Decompressed {} to {}", path.display(), target.display());
                decompressed += 1;
            }
            Err(e) => {
                log_warning(&format!("Failed to decompress archive: {e}"), Some(path));
            }
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    log::info!(
        "Decompressed {} of {} archives in {}",
        decompressed,
        archives.len(),
        dir.display()
    );
    Ok(decompressed)
}

fn decompress_archive(path: &Path) -> Result<PathBuf> {
    let target = path.with_extension("");
    let mut decoder = GzDecoder::new(File::open(path)?);
    let mut contents = Vec::new();
    decoder.read_to_end(&mut contents)?;
    let mut out = File::create(&target)?;
    out.write_all(&contents)?;
    Ok(target)
}

/// Read one delimited text file into an all-string record batch
///
/// The bytes are decoded as Windows-1252 before parsing; empty fields are
/// normalized to nulls so that downstream stages see a single notion of
/// "missing".
///
/// # Errors
/// Returns an error if the file cannot be read or parsed
pub fn read_delimited_file(path: &Path, delimiter: u8, batch_size: usize) -> Result<RecordBatch> {
    log_operation_start("Reading delimited file", path);
    let bytes = std::fs::read(path)?;
    let (text, _, _) = WINDOWS_1252.decode(&bytes);

    let schema = schema_from_header(&text, delimiter, path)?;
    let reader = ReaderBuilder::new(schema.clone())
        .with_header(true)
        .with_delimiter(delimiter)
        .with_batch_size(batch_size)
        .build(Cursor::new(text.as_bytes()))?;

    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    let combined = if batches.is_empty() {
        RecordBatch::new_empty(schema)
    } else {
        concat_batches(&batches[0].schema(), &batches)?
    };

    nullify_empty_strings(&combined)
}

/// Build an all-Utf8 nullable schema from the header line
fn schema_from_header(text: &str, delimiter: u8, path: &Path) -> Result<SchemaRef> {
    let header = text
        .lines()
        .next()
        .ok_or_else(|| PipelineError::Ingest(format!("File {} is empty", path.display())))?;

    let fields = header
        .split(delimiter as char)
        .map(|name| Field::new(name.trim(), DataType::Utf8, true))
        .collect_vec();
    if fields.is_empty() {
        return Err(PipelineError::Ingest(format!(
            "File {} has no header columns",
            path.display()
        )));
    }
    Ok(Arc::new(Schema::new(fields)))
}

/// Replace empty strings with nulls in every string column
fn nullify_empty_strings(batch: &RecordBatch) -> Result<RecordBatch> {
    use arrow::array::{Array, ArrayRef, StringArray, StringBuilder};

    let columns = batch
        .columns()
        .iter()
        .map(|col| {
            let Some(strings) = col.as_any().downcast_ref::<StringArray>() else {
                return Ok(Arc::clone(col));
            };
            let mut builder = StringBuilder::new();
            for i in 0..strings.len() {
                if strings.is_null(i) || strings.value(i).is_empty() {
                    builder.append_null();
                } else {
                    builder.append_value(strings.value(i));
                }
            }
            Ok(Arc::new(builder.finish()) as ArrayRef)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(RecordBatch::try_new(batch.schema(), columns)?)
}

/// Ingest every decompressed dump file in the input directory
///
/// Files are read in name order so repeated runs over the same directory
/// produce an identical table. All files must share one column set.
///
/// # Errors
/// Returns an error if no dump files are found or their schemas disagree
pub fn ingest_directory(config: &PipelineConfig) -> Result<RecordBatch> {
    decompress_archives(&config.input_dir, &config.file_prefix)?;

    let files = list_files(&config.input_dir, &config.file_prefix, "txt")?;
    if files.is_empty() {
        return Err(PipelineError::Ingest(format!(
            "No {}*.txt files found in {}",
            config.file_prefix,
            config.input_dir.display()
        )));
    }

    let progress = ProgressBar::new(files.len() as u64);
    let mut batches = Vec::with_capacity(files.len());
    for path in &files {
        progress.set_message(path.display().to_string());
        let batch = read_delimited_file(path, config.delimiter, config.batch_size)?;
        if let Some(first) = batches.first() {
            validate_same_columns(first, &batch, path)?;
        }
        batches.push(batch);
        progress.inc(1);
    }
    progress.finish_and_clear();

    let schema = batches[0].schema();
    let combined = concat_batches(&schema, &batches)?;
    log::info!(
        "Ingested {} rows from {} dump files",
        combined.num_rows(),
        files.len()
    );
    Ok(combined)
}

/// All files in `dir` named `<prefix>*.<extension>`, sorted by name
fn list_files(dir: &Path, prefix: &str, extension: &str) -> Result<Vec<PathBuf>> {
    let files = std::fs::read_dir(dir)?
        .filter_map(|entry| {
            let path = entry.ok()?.path();
            let name = path.file_name()?.to_str()?;
            (path.is_file() && name.starts_with(prefix)).then_some(path.clone())
        })
        .filter(|path| path.extension().is_some_and(|ext| ext == extension))
        .sorted()
        .collect_vec();
    Ok(files)
}

fn validate_same_columns(first: &RecordBatch, current: &RecordBatch, path: &Path) -> Result<()> {
    let expected = first
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect_vec();
    let actual = current
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect_vec();
    if expected != actual {
        return Err(PipelineError::Ingest(format!(
            "Column set of {} does not match the first dump file",
            path.display()
        )));
    }
    Ok(())
}
