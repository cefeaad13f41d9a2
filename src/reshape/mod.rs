//! Wide-to-long reshaping of the raw HOA table.
//!
//! The dump delivers up to four fee slots per property as repeated column
//! groups. After demangling the column names, the reshaper pivots each slot
//! into its own row keyed by (`PropertyID`, `hoa_num`), carrying all
//! property-level columns through unchanged.

pub mod demangle;

use std::collections::BTreeMap;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Builder, Int32Builder, StringArray, StringBuilder,
};
use arrow::compute::filter_record_batch;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use itertools::Itertools;

use crate::error::{PipelineError, Result};
use self::demangle::{demangle_columns, parse_long_name};

/// Unique property key column in the raw dump
pub const PROPERTY_ID: &str = "PropertyID";
/// Slot index column introduced by the reshape (1-based)
pub const HOA_NUM: &str = "hoa_num";

/// Highest slot index the wide schema can carry
pub const MAX_SLOTS: u8 = 4;

/// Rename all wide columns to their demangled `<base>HOA_<slot>` form
///
/// Column order and data are untouched, only the schema names change.
///
/// # Errors
/// Returns an error if the renamed schema is invalid
pub fn demangle_batch(batch: &RecordBatch) -> Result<RecordBatch> {
    let names = batch
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect_vec();
    let renamed = demangle_columns(&names);

    let fields = batch
        .schema()
        .fields()
        .iter()
        .zip(renamed)
        .map(|(field, name)| Field::new(name, field.data_type().clone(), field.is_nullable()))
        .collect_vec();
    let schema = Arc::new(Schema::new(fields));
    Ok(RecordBatch::try_new(schema, batch.columns().to_vec())?)
}

/// Repeated-attribute group discovered in a demangled wide schema
struct SlotGroup {
    /// Column index per slot, `None` where the dump lacks that slot
    columns: [Option<usize>; MAX_SLOTS as usize],
}

/// Pivot the demangled wide table into long format
///
/// Emits one row per (property row, slot) pair for every slot index that has
/// at least one column in the dump. The fee column named by `fee_column` is
/// parsed to Float64 during the pivot (missing slots become nulls); all
/// other attributes stay strings. A table with no repeated-attribute groups
/// passes through unchanged.
///
/// # Errors
/// Returns an error if `PropertyID` is missing, a pivoted column is not a
/// string column, or a non-empty fee value fails to parse as a number
pub fn wide_to_long(batch: &RecordBatch, fee_column: &str) -> Result<RecordBatch> {
    let schema = batch.schema();

    // Group demangled columns by their base attribute.
    let mut groups: BTreeMap<String, SlotGroup> = BTreeMap::new();
    for (idx, field) in schema.fields().iter().enumerate() {
        if let Some((base, slot)) = parse_long_name(field.name()) {
            let group = groups.entry(base.to_string()).or_insert(SlotGroup {
                columns: [None; MAX_SLOTS as usize],
            });
            group.columns[slot as usize - 1] = Some(idx);
        }
    }
    if groups.is_empty() {
        log::warn!("No repeated-attribute columns found, reshape is a pass-through");
        return Ok(batch.clone());
    }

    let slots = (1..=MAX_SLOTS)
        .filter(|slot| {
            groups
                .values()
                .any(|g| g.columns[*slot as usize - 1].is_some())
        })
        .collect_vec();

    let property_id = string_column_at(
        batch,
        schema
            .index_of(PROPERTY_ID)
            .map_err(|_| PipelineError::Schema(format!("Column {PROPERTY_ID} not found")))?,
    )?;

    // Property-level columns carried through on every emitted row.
    let carried = schema
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, field)| {
            field.name() != PROPERTY_ID && parse_long_name(field.name()).is_none()
        })
        .map(|(idx, field)| Ok((field.name().clone(), string_column_at(batch, idx)?)))
        .collect::<Result<Vec<_>>>()?;

    let group_arrays = groups
        .iter()
        .map(|(base, group)| {
            let arrays = group
                .columns
                .iter()
                .map(|idx| idx.map(|i| string_column_at(batch, i)).transpose())
                .collect::<Result<Vec<_>>>()?;
            Ok((base.clone(), arrays))
        })
        .collect::<Result<Vec<_>>>()?;

    let n_rows = batch.num_rows();
    let mut id_builder = StringBuilder::new();
    let mut slot_builder = Int32Builder::new();
    let mut fee_builder = Float64Builder::new();
    let mut value_builders: BTreeMap<&str, StringBuilder> = group_arrays
        .iter()
        .filter(|(base, _)| format!("{base}HOA_") != fee_column)
        .map(|(base, _)| (base.as_str(), StringBuilder::new()))
        .collect();
    let mut carried_builders = carried.iter().map(|_| StringBuilder::new()).collect_vec();

    for row in 0..n_rows {
        for &slot in &slots {
            if property_id.is_null(row) {
                id_builder.append_null();
            } else {
                id_builder.append_value(property_id.value(row));
            }
            slot_builder.append_value(i32::from(slot));

            for (base, arrays) in &group_arrays {
                let value = arrays[slot as usize - 1]
                    .filter(|a| !a.is_null(row))
                    .map(|a| a.value(row));
                if format!("{base}HOA_") == fee_column {
                    append_fee(&mut fee_builder, value, row)?;
                } else {
                    let builder = value_builders
                        .get_mut(base.as_str())
                        .ok_or_else(|| PipelineError::Schema(format!("No builder for {base}")))?;
                    match value {
                        Some(v) => builder.append_value(v),
                        None => builder.append_null(),
                    }
                }
            }

            for ((_, array), builder) in carried.iter().zip(&mut carried_builders) {
                if array.is_null(row) {
                    builder.append_null();
                } else {
                    builder.append_value(array.value(row));
                }
            }
        }
    }

    let mut fields = vec![
        Field::new(PROPERTY_ID, DataType::Utf8, true),
        Field::new(HOA_NUM, DataType::Int32, false),
    ];
    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(id_builder.finish()),
        Arc::new(slot_builder.finish()),
    ];

    let mut has_fee_group = false;
    for (base, _) in &group_arrays {
        let name = format!("{base}HOA_");
        if name == fee_column {
            fields.push(Field::new(&name, DataType::Float64, true));
            columns.push(Arc::new(fee_builder.finish()));
            has_fee_group = true;
        } else {
            fields.push(Field::new(&name, DataType::Utf8, true));
            let builder = value_builders
                .get_mut(base.as_str())
                .ok_or_else(|| PipelineError::Schema(format!("No builder for {base}")))?;
            columns.push(Arc::new(builder.finish()));
        }
    }
    if !has_fee_group {
        log::warn!("Fee column {fee_column} has no repeated-attribute group in this dump");
    }

    for ((name, _), builder) in carried.iter().zip(&mut carried_builders) {
        fields.push(Field::new(name, DataType::Utf8, true));
        columns.push(Arc::new(builder.finish()));
    }

    let long = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
    log::info!(
        "Reshaped {} wide rows into {} long rows over slots {:?}",
        n_rows,
        long.num_rows(),
        slots
    );
    Ok(long)
}

fn append_fee(builder: &mut Float64Builder, value: Option<&str>, row: usize) -> Result<()> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => builder.append_null(),
        Some(v) => match v.parse::<f64>() {
            // A literal NaN token means "no fee recorded", same as a blank
            // field; it must not survive as a float NaN.
            Ok(fee) if fee.is_nan() => builder.append_null(),
            Ok(fee) if fee.is_infinite() => {
                return Err(PipelineError::Integrity(format!(
                    "Non-finite fee value {v:?} in wide row {row}"
                )));
            }
            Ok(fee) => builder.append_value(fee),
            Err(_) => {
                return Err(PipelineError::Integrity(format!(
                    "Unparseable fee value {v:?} in wide row {row}"
                )));
            }
        },
    }
    Ok(())
}

/// Drop long rows whose fee value is missing
///
/// These are the unused slots of properties with fewer than four HOAs, not
/// real records.
///
/// # Errors
/// Returns an error if the fee column is absent or not Float64
pub fn drop_missing_fees(batch: &RecordBatch, fee_column: &str) -> Result<RecordBatch> {
    let fees = crate::utils::float_column(batch, fee_column)?;
    let mask = BooleanArray::from_iter((0..fees.len()).map(|i| Some(!fees.is_null(i))));
    let filtered = filter_record_batch(batch, &mask)?;
    log::info!(
        "Dropped {} empty fee slots, {} HOA records remain",
        batch.num_rows() - filtered.num_rows(),
        filtered.num_rows()
    );
    Ok(filtered)
}

fn string_column_at(batch: &RecordBatch, idx: usize) -> Result<&StringArray> {
    let field = batch.schema_ref().field(idx).name().clone();
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| PipelineError::Schema(format!("Column {field} is not a string array")))
}
