//! End-to-end pipeline orchestration.
//!
//! Stages run strictly in sequence over fully materialized tables: ingest,
//! demangle, reshape, empty-slot filter, property aggregates, median price
//! join, one-hot encoding, schema alignment. The raw and long tables are
//! checkpointed to Parquet so a run can be audited or resumed from either
//! stage; the long checkpoint is written before the empty-slot filter, so it
//! still contains the blank slots of properties with fewer than four HOAs.

use std::path::PathBuf;
use std::time::Instant;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::features::aggregate::{add_property_aggregates, NUM_HOAS, PROP_TOTAL_FEES, TOTAL_FEES};
use crate::features::align::{align_to_schema, TRAINING_COLUMNS};
use crate::features::encode::encode_features;
use crate::features::price::{join_median_price, PriceReference, MEDIAN_PRICE};
use crate::ingest::ingest_directory;
use crate::reshape::{demangle_batch, drop_missing_fees, wide_to_long};
use crate::utils::write_parquet;

/// Checkpoint of the concatenated raw wide table
pub const RAW_CHECKPOINT: &str = "hoa_data_raw.parquet";
/// Checkpoint of the long table, written before the empty-slot filter
pub const LONG_CHECKPOINT: &str = "hoa_data_long.parquet";
/// Final aligned feature matrix
pub const OUTPUT_FILE: &str = "processed_data_for_pred.parquet";

/// One batch-prediction preprocessing run
pub struct Pipeline {
    config: PipelineConfig,
    training_columns: Vec<String>,
}

impl Pipeline {
    /// Pipeline with the version-controlled training schema
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_training_columns(
            config,
            TRAINING_COLUMNS.iter().map(ToString::to_string).collect(),
        )
    }

    /// Pipeline aligned to an explicit column list (used by tests and
    /// retrained models)
    #[must_use]
    pub fn with_training_columns(config: PipelineConfig, training_columns: Vec<String>) -> Self {
        Self {
            config,
            training_columns,
        }
    }

    /// Run every stage and persist the final matrix
    ///
    /// Returns the path of the written feature table.
    ///
    /// # Errors
    /// Any stage failure aborts the run; no partial output is published
    pub fn run(&self, prices: &PriceReference) -> Result<PathBuf> {
        let start = Instant::now();
        let config = &self.config;
        std::fs::create_dir_all(&config.output_dir)?;

        let raw = ingest_directory(config)?;
        write_parquet(&raw, &config.output_dir.join(RAW_CHECKPOINT))?;

        let long = wide_to_long(&demangle_batch(&raw)?, &config.fee_column)?;
        write_parquet(&long, &config.output_dir.join(LONG_CHECKPOINT))?;

        let records = drop_missing_fees(&long, &config.fee_column)?;
        let aggregated = add_property_aggregates(&records, &config.fee_column)?;
        let priced = join_median_price(
            &aggregated,
            prices,
            &config.zip_column,
            &config.state_column,
        )?;

        let dummy_columns = [config.type_column.as_str(), config.state_column.as_str()];
        let continuous_columns = [
            config.fee_column.as_str(),
            PROP_TOTAL_FEES,
            TOTAL_FEES,
            MEDIAN_PRICE,
            NUM_HOAS,
        ];
        let encoded = encode_features(&priced, &dummy_columns, &continuous_columns)?;

        let expected = self
            .training_columns
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>();
        let aligned = align_to_schema(&encoded, &expected)?;

        let output_path = config.output_dir.join(OUTPUT_FILE);
        write_parquet(&aligned, &output_path)?;
        log::info!(
            "Pipeline finished: {} rows x {} columns in {:?}",
            aligned.num_rows(),
            aligned.num_columns(),
            start.elapsed()
        );
        Ok(output_path)
    }
}
