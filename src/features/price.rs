//! Median listing price reference data.
//!
//! The price store supplies two query results, zip → median price and
//! state → median price. The pipeline only needs them as in-memory lookup
//! tables; imputation is a prioritized lookup chain that stops at the first
//! hit (zip first, state second) and otherwise leaves the price missing for
//! the final no-missing-values assertion to catch.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, Float64Builder, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use itertools::Itertools;

use crate::error::{PipelineError, Result};
use crate::ingest::read_delimited_file;
use crate::utils::string_column;

/// Median price column added by the join
pub const MEDIAN_PRICE: &str = "median_price";

/// In-memory price lookup tables, loaded once per run
#[derive(Debug, Clone, Default)]
pub struct PriceReference {
    zip_prices: HashMap<String, f64>,
    state_prices: HashMap<String, f64>,
}

impl PriceReference {
    /// Build a reference from already-materialized lookup tables
    #[must_use]
    pub fn new(zip_prices: HashMap<String, f64>, state_prices: HashMap<String, f64>) -> Self {
        Self {
            zip_prices,
            state_prices,
        }
    }

    /// Load the reference from two persisted query results
    ///
    /// Each file is a delimited table whose first column is the geography
    /// key and whose `median_price` column carries the price.
    ///
    /// # Errors
    /// Returns an error if either file cannot be read or lacks the
    /// expected columns
    pub fn from_files(zip_path: &Path, state_path: &Path, delimiter: u8) -> Result<Self> {
        let zip_batch = read_delimited_file(zip_path, delimiter, 16384)?;
        let state_batch = read_delimited_file(state_path, delimiter, 16384)?;
        Ok(Self::new(
            lookup_table(&zip_batch, "zip")?,
            lookup_table(&state_batch, "state")?,
        ))
    }

    /// Median price for a record, zip level first, state fallback second
    #[must_use]
    pub fn median_price(&self, zip: Option<&str>, state: Option<&str>) -> Option<f64> {
        zip.and_then(|z| self.zip_prices.get(z.trim()))
            .or_else(|| state.and_then(|s| self.state_prices.get(s.trim())))
            .copied()
    }
}

/// Turn a two-column query result into a key → price map
///
/// # Errors
/// Returns an error if the key or `median_price` column is absent, or a
/// price value fails to parse
fn lookup_table(batch: &RecordBatch, key_column: &str) -> Result<HashMap<String, f64>> {
    let keys = string_column(batch, key_column)?;
    let prices = batch
        .column_by_name(MEDIAN_PRICE)
        .ok_or_else(|| PipelineError::Schema(format!("Column {MEDIAN_PRICE} not found")))?;

    let mut table = HashMap::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        if keys.is_null(row) {
            continue;
        }
        let price = if let Some(floats) = prices.as_any().downcast_ref::<Float64Array>() {
            (!floats.is_null(row)).then(|| floats.value(row))
        } else if let Some(strings) = prices.as_any().downcast_ref::<StringArray>() {
            if strings.is_null(row) {
                None
            } else {
                Some(strings.value(row).trim().parse::<f64>().map_err(|_| {
                    PipelineError::Schema(format!(
                        "Unparseable {MEDIAN_PRICE} value {:?} for key {}",
                        strings.value(row),
                        keys.value(row)
                    ))
                })?)
            }
        } else {
            return Err(PipelineError::Schema(format!(
                "Column {MEDIAN_PRICE} is neither Float64 nor string"
            )));
        };
        if let Some(price) = price {
            table.insert(keys.value(row).trim().to_string(), price);
        }
    }
    Ok(table)
}

/// Left-join the median price onto every long row
///
/// Appends a nullable `median_price` column; rows whose zip and state are
/// both unmapped keep a null. Exactly one output row per input row.
///
/// # Errors
/// Returns an error if the zip or state column is absent
pub fn join_median_price(
    batch: &RecordBatch,
    reference: &PriceReference,
    zip_column: &str,
    state_column: &str,
) -> Result<RecordBatch> {
    let zips = string_column(batch, zip_column)?;
    let states = string_column(batch, state_column)?;

    let mut prices = Float64Builder::new();
    let mut zip_hits = 0usize;
    let mut state_hits = 0usize;
    let mut misses = 0usize;
    for row in 0..batch.num_rows() {
        let zip = (!zips.is_null(row)).then(|| zips.value(row));
        let state = (!states.is_null(row)).then(|| states.value(row));
        match reference.median_price(zip, None) {
            Some(price) => {
                prices.append_value(price);
                zip_hits += 1;
            }
            None => match reference.median_price(None, state) {
                Some(price) => {
                    prices.append_value(price);
                    state_hits += 1;
                }
                None => {
                    prices.append_null();
                    misses += 1;
                }
            },
        }
    }

    let mut fields = batch
        .schema()
        .fields()
        .iter()
        .map(|f| f.as_ref().clone())
        .collect_vec();
    fields.push(Field::new(MEDIAN_PRICE, DataType::Float64, true));
    let mut columns = batch.columns().to_vec();
    columns.push(Arc::new(prices.finish()) as ArrayRef);

    let joined = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
    if joined.num_rows() != batch.num_rows() {
        return Err(PipelineError::Integrity(format!(
            "Median price join changed the row count: {} in, {} out",
            batch.num_rows(),
            joined.num_rows()
        )));
    }
    log::info!(
        "Median price join: {zip_hits} zip matches, {state_hits} state fallbacks, {misses} unmapped"
    );
    Ok(joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> PriceReference {
        PriceReference::new(
            HashMap::from([("90210".to_string(), 1_200_000.0)]),
            HashMap::from([("CA".to_string(), 750_000.0)]),
        )
    }

    #[test]
    fn zip_lookup_wins_over_state() {
        let prices = reference();
        assert_eq!(
            prices.median_price(Some("90210"), Some("CA")),
            Some(1_200_000.0)
        );
    }

    #[test]
    fn state_fallback_applies_when_zip_unmapped() {
        let prices = reference();
        assert_eq!(
            prices.median_price(Some("00000"), Some("CA")),
            Some(750_000.0)
        );
        assert_eq!(prices.median_price(None, Some("CA")), Some(750_000.0));
    }

    #[test]
    fn unmapped_geography_stays_missing() {
        let prices = reference();
        assert_eq!(prices.median_price(Some("00000"), Some("ZZ")), None);
        assert_eq!(prices.median_price(None, None), None);
    }
}
