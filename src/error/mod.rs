//! Error handling for the HOA feature pipeline.

use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use std::io;

/// Errors that can occur while building the feature table
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Error opening or reading a file
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Error from Arrow kernels or the CSV parser
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    /// Error reading or writing Parquet data
    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),

    /// A required column is absent or has an unexpected type
    #[error("Schema error: {0}")]
    Schema(String),

    /// Error assembling the raw table from the input directory
    #[error("Ingest error: {0}")]
    Ingest(String),

    /// A data-integrity invariant was violated (join cardinality,
    /// unparseable fee value, zero fee total)
    #[error("Data integrity error: {0}")]
    Integrity(String),

    /// The assembled feature matrix contains missing values
    #[error("Missing values detected: {0}")]
    MissingValues(String),
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
