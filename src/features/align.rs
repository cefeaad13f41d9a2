//! Alignment of the encoded matrix to the fixed training schema.
//!
//! The training-time column list is version-controlled here and passed to
//! the aligner explicitly. A categorical level absent from the current batch
//! simply yields no indicator column, so the aligner adds every expected
//! column that is missing as all-zeros. Extra columns the training schema
//! does not know are retained after the expected ones; the downstream model
//! selects its inputs by name and tolerates supersets.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use itertools::Itertools;

use crate::error::{PipelineError, Result};
use crate::features::encode::{assert_no_missing_values, HOA_ID};

/// Ordered column list the downstream model was trained on
pub const TRAINING_COLUMNS: &[&str] = &[
    "TypeHOA__COA",
    "TypeHOA__HOA",
    "TypeHOA__PUD",
    "TypeHOA__nan",
    "SitusState_AK",
    "SitusState_AL",
    "SitusState_AR",
    "SitusState_AZ",
    "SitusState_CA",
    "SitusState_CO",
    "SitusState_CT",
    "SitusState_DC",
    "SitusState_DE",
    "SitusState_FL",
    "SitusState_GA",
    "SitusState_HI",
    "SitusState_IA",
    "SitusState_ID",
    "SitusState_IL",
    "SitusState_IN",
    "SitusState_KS",
    "SitusState_KY",
    "SitusState_LA",
    "SitusState_MA",
    "SitusState_MD",
    "SitusState_ME",
    "SitusState_MI",
    "SitusState_MN",
    "SitusState_MO",
    "SitusState_MS",
    "SitusState_MT",
    "SitusState_NC",
    "SitusState_NE",
    "SitusState_NH",
    "SitusState_NJ",
    "SitusState_NM",
    "SitusState_NV",
    "SitusState_NY",
    "SitusState_OH",
    "SitusState_OK",
    "SitusState_OR",
    "SitusState_PA",
    "SitusState_RI",
    "SitusState_SC",
    "SitusState_TN",
    "SitusState_TX",
    "SitusState_UT",
    "SitusState_VA",
    "SitusState_WA",
    "SitusState_WI",
    "SitusState_WV",
    "SitusState_WY",
    "SitusState_nan",
    "FeeValueHOA_",
    "prop_total_fees",
    "total_fees",
    "median_price",
    "num_hoas",
];

/// Reconcile the encoded matrix with the fixed training schema
///
/// Output layout: `hoa_id`, then every expected column in reference order
/// (zero-filled where the batch lacks it), then any extra columns in their
/// batch order. Re-asserts that no missing values remain.
///
/// # Errors
/// Returns an error if `hoa_id` is absent or missing values are detected
pub fn align_to_schema(batch: &RecordBatch, expected: &[&str]) -> Result<RecordBatch> {
    let by_name: HashMap<&str, (&Field, &ArrayRef)> = batch
        .schema_ref()
        .fields()
        .iter()
        .zip(batch.columns())
        .map(|(field, column)| (field.name().as_str(), (field.as_ref(), column)))
        .collect();

    let (id_field, id_column) = by_name
        .get(HOA_ID)
        .ok_or_else(|| PipelineError::Schema(format!("Column {HOA_ID} not found")))?;
    let mut fields = vec![(*id_field).clone()];
    let mut columns: Vec<ArrayRef> = vec![Arc::clone(*id_column)];

    let mut zero_filled = Vec::new();
    for name in expected {
        if *name == HOA_ID {
            continue;
        }
        match by_name.get(name) {
            Some((field, column)) => {
                fields.push((*field).clone());
                columns.push(Arc::clone(*column));
            }
            None => {
                let zeros = std::iter::repeat(0.0)
                    .take(batch.num_rows())
                    .collect::<Float64Array>();
                fields.push(Field::new(*name, DataType::Float64, false));
                columns.push(Arc::new(zeros) as ArrayRef);
                zero_filled.push(*name);
            }
        }
    }
    if !zero_filled.is_empty() {
        log::info!(
            "Zero-filled {} expected columns absent from this batch: {}",
            zero_filled.len(),
            zero_filled.iter().join(", ")
        );
    }

    // Columns the training schema does not know are kept, after the fixed part.
    for (field, column) in batch.schema_ref().fields().iter().zip(batch.columns()) {
        let name = field.name().as_str();
        if name != HOA_ID && !expected.contains(&name) {
            fields.push(field.as_ref().clone());
            columns.push(Arc::clone(column));
        }
    }

    let aligned = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
    assert_no_missing_values(&aligned)?;
    Ok(aligned)
}
