//! Per-property aggregate features.
//!
//! Every aggregate is computed once over the filtered long table, grouped by
//! `PropertyID`, then broadcast back onto each of the property's rows. A row
//! whose property has no aggregate entry cannot occur when the aggregates
//! come from the same table, so a failed lookup is an integrity error rather
//! than a missing value.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Builder, Int32Builder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use itertools::Itertools;

use crate::error::{PipelineError, Result};
use crate::reshape::{HOA_NUM, PROPERTY_ID};
use crate::utils::{float_column, int_column, string_column};

/// Max slot index present for the property
pub const NUM_HOAS: &str = "num_hoas";
/// 1 when the property has more than one HOA, else 0
pub const GREATER_THAN_1_HOA: &str = "greater_than_1_hoa";
/// Sum of fee values across the property's records
pub const TOTAL_FEES: &str = "total_fees";
/// This record's share of the property's total fees
pub const PROP_TOTAL_FEES: &str = "prop_total_fees";

struct PropertyAggregate {
    max_slot: i32,
    total_fees: f64,
}

/// Compute and broadcast-join the per-property aggregates
///
/// Adds `num_hoas`, `greater_than_1_hoa`, `total_fees` and the per-row ratio
/// `prop_total_fees` = fee / `total_fees`. Expects the missing-fee filter to
/// have run already, so every row carries a fee value.
///
/// # Errors
/// Returns an integrity error if a row has a missing `PropertyID` or fee
/// value, or if a property's fee total is zero (the ratio would be
/// undefined)
pub fn add_property_aggregates(batch: &RecordBatch, fee_column: &str) -> Result<RecordBatch> {
    let property_ids = string_column(batch, PROPERTY_ID)?;
    let slots = int_column(batch, HOA_NUM)?;
    let fees = float_column(batch, fee_column)?;

    let mut aggregates: HashMap<&str, PropertyAggregate> = HashMap::new();
    for row in 0..batch.num_rows() {
        if property_ids.is_null(row) {
            return Err(PipelineError::Integrity(format!(
                "Missing {PROPERTY_ID} in long row {row}"
            )));
        }
        if fees.is_null(row) {
            return Err(PipelineError::Integrity(format!(
                "Missing fee value in long row {row} after the empty-slot filter"
            )));
        }
        let entry = aggregates
            .entry(property_ids.value(row))
            .or_insert(PropertyAggregate {
                max_slot: 0,
                total_fees: 0.0,
            });
        entry.max_slot = entry.max_slot.max(slots.value(row));
        entry.total_fees += fees.value(row);
    }

    let mut num_hoas = Int32Builder::new();
    let mut greater_than_1 = Int32Builder::new();
    let mut total_fees = Float64Builder::new();
    let mut prop_total_fees = Float64Builder::new();
    for row in 0..batch.num_rows() {
        let aggregate = aggregates.get(property_ids.value(row)).ok_or_else(|| {
            PipelineError::Integrity(format!(
                "No aggregate entry for property {} (broadcast join lost a key)",
                property_ids.value(row)
            ))
        })?;
        if aggregate.total_fees == 0.0 {
            return Err(PipelineError::Integrity(format!(
                "Property {} has a zero fee total, cannot derive fee proportions",
                property_ids.value(row)
            )));
        }
        num_hoas.append_value(aggregate.max_slot);
        greater_than_1.append_value(i32::from(aggregate.max_slot > 1));
        total_fees.append_value(aggregate.total_fees);
        prop_total_fees.append_value(fees.value(row) / aggregate.total_fees);
    }

    let mut fields = batch
        .schema()
        .fields()
        .iter()
        .map(|f| f.as_ref().clone())
        .collect_vec();
    fields.push(Field::new(GREATER_THAN_1_HOA, DataType::Int32, false));
    fields.push(Field::new(TOTAL_FEES, DataType::Float64, false));
    fields.push(Field::new(PROP_TOTAL_FEES, DataType::Float64, false));
    fields.push(Field::new(NUM_HOAS, DataType::Int32, false));

    let mut columns = batch.columns().to_vec();
    columns.push(Arc::new(greater_than_1.finish()) as ArrayRef);
    columns.push(Arc::new(total_fees.finish()) as ArrayRef);
    columns.push(Arc::new(prop_total_fees.finish()) as ArrayRef);
    columns.push(Arc::new(num_hoas.finish()) as ArrayRef);

    log::info!(
        "Aggregated {} HOA records across {} properties",
        batch.num_rows(),
        aggregates.len()
    );
    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}
