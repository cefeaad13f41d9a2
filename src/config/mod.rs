//! Configuration for the HOA feature pipeline.

use std::path::PathBuf;

/// Configuration for one pipeline run
///
/// Column names refer to the post-reshape (long) table: repeated attributes
/// carry a `HOA_` suffix once the slot index has been pivoted into `hoa_num`.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory scanned for raw dump files
    pub input_dir: PathBuf,
    /// Directory receiving checkpoints and the final matrix
    pub output_dir: PathBuf,
    /// Input files must start with this prefix (e.g. `HOA`)
    pub file_prefix: String,
    /// Field delimiter of the raw dump files
    pub delimiter: u8,
    /// Rows per batch when parsing delimited text
    pub batch_size: usize,
    /// Fee value column in the long table; rows where it is missing are
    /// unused slots and get dropped
    pub fee_column: String,
    /// Fee type column in the long table (one-hot encoded)
    pub type_column: String,
    /// Property-level zip code column (price lookup key)
    pub zip_column: String,
    /// Property-level state column (price fallback key, one-hot encoded)
    pub state_column: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("data"),
            file_prefix: "HOA".to_string(),
            delimiter: b'|',
            batch_size: 16384,
            fee_column: "FeeValueHOA_".to_string(),
            type_column: "TypeHOA_".to_string(),
            zip_column: "SitusZIP5".to_string(),
            state_column: "SitusState".to_string(),
        }
    }
}
