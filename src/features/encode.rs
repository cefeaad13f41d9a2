//! Assembly of the numeric feature matrix.
//!
//! Nominal columns are one-hot encoded with an explicit `nan` indicator, so
//! a categorical with `k` observed values produces `k + 1` columns and every
//! row sets exactly one of them. The encoded matrix is indexed by `hoa_id`
//! and must contain no missing values; a violation means an upstream join or
//! reshape defect and aborts the run.

use std::collections::BTreeSet;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, StringBuilder};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use itertools::Itertools;

use crate::error::{PipelineError, Result};
use crate::reshape::{HOA_NUM, PROPERTY_ID};
use crate::utils::{int_column, string_column};

/// Unique record key of the final matrix: `<PropertyID>_<hoa_num>`
pub const HOA_ID: &str = "hoa_id";

/// One-hot encode the nominal columns and assemble the feature matrix
///
/// The output starts with `hoa_id`, followed by one indicator group per
/// entry of `dummy_columns` (observed values in sorted order, then the
/// `_nan` indicator) and the `continuous_columns` cast to Float64.
///
/// # Errors
/// Returns an error if a named column is absent, or missing values survive
/// into the assembled matrix
pub fn encode_features(
    batch: &RecordBatch,
    dummy_columns: &[&str],
    continuous_columns: &[&str],
) -> Result<RecordBatch> {
    let mut fields = vec![Field::new(HOA_ID, DataType::Utf8, false)];
    let mut columns: Vec<ArrayRef> = vec![Arc::new(hoa_id_column(batch)?)];

    for &name in dummy_columns {
        let values = string_column(batch, name)?;
        let levels: BTreeSet<&str> = (0..values.len())
            .filter(|&i| !values.is_null(i))
            .map(|i| values.value(i))
            .collect();

        for level in &levels {
            let indicators = (0..values.len())
                .map(|i| {
                    if !values.is_null(i) && values.value(i) == *level {
                        1.0
                    } else {
                        0.0
                    }
                })
                .collect::<Float64Array>();
            fields.push(Field::new(format!("{name}_{level}"), DataType::Float64, false));
            columns.push(Arc::new(indicators) as ArrayRef);
        }

        let nan_indicators = (0..values.len())
            .map(|i| if values.is_null(i) { 1.0 } else { 0.0 })
            .collect::<Float64Array>();
        fields.push(Field::new(format!("{name}_nan"), DataType::Float64, false));
        columns.push(Arc::new(nan_indicators) as ArrayRef);
    }

    for &name in continuous_columns {
        let column = batch
            .column_by_name(name)
            .ok_or_else(|| PipelineError::Schema(format!("Column {name} not found")))?;
        let as_float = if column.data_type() == &DataType::Float64 {
            Arc::clone(column)
        } else {
            cast(column, &DataType::Float64)?
        };
        fields.push(Field::new(name, DataType::Float64, true));
        columns.push(as_float);
    }

    let matrix = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
    assert_no_missing_values(&matrix)?;
    log::info!(
        "Encoded feature matrix: {} rows x {} columns",
        matrix.num_rows(),
        matrix.num_columns()
    );
    Ok(matrix)
}

/// Build the `hoa_id` index column
///
/// # Errors
/// Returns an integrity error if a row lacks a `PropertyID`
fn hoa_id_column(batch: &RecordBatch) -> Result<arrow::array::StringArray> {
    let property_ids = string_column(batch, PROPERTY_ID)?;
    let slots = int_column(batch, HOA_NUM)?;

    let mut builder = StringBuilder::new();
    for row in 0..batch.num_rows() {
        if property_ids.is_null(row) {
            return Err(PipelineError::Integrity(format!(
                "Cannot build {HOA_ID} for row {row}: {PROPERTY_ID} is missing"
            )));
        }
        builder.append_value(format!(
            "{}_{}",
            property_ids.value(row),
            slots.value(row)
        ));
    }
    Ok(builder.finish())
}

/// Fail if any value anywhere in the matrix is missing
///
/// Float64 columns count NaN as missing alongside nulls, so a NaN smuggled
/// through an upstream computation cannot ship in the final matrix.
///
/// # Errors
/// Returns a missing-values error naming the offending columns
pub fn assert_no_missing_values(batch: &RecordBatch) -> Result<()> {
    let offenders = batch
        .schema()
        .fields()
        .iter()
        .zip(batch.columns())
        .filter_map(|(field, column)| {
            let mut missing = column.null_count();
            if let Some(floats) = column.as_any().downcast_ref::<Float64Array>() {
                missing += (0..floats.len())
                    .filter(|&i| !floats.is_null(i) && floats.value(i).is_nan())
                    .count();
            }
            (missing > 0).then(|| format!("{} ({missing} missing)", field.name()))
        })
        .collect_vec();
    if offenders.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::MissingValues(offenders.join(", ")))
    }
}
