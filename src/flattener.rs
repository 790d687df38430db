//! Explodes the JSON `OUTPUTS` column of a transactions table into one row per
//! transaction output.
//!
//! Every input row is expanded into one row per element of its outputs array.
//! The parent's other columns are gathered alongside, elements without an
//! address are dropped, and all column names are uppercased. Rows with a null
//! or empty array produce nothing.

use std::fmt;

use ahash::AHashSet;
use arrow2::array::growable::make_growable;
use arrow2::array::{Array, Float64Array, Int64Array, PrimitiveArray, Utf8Array};
use arrow2::compute::take::{can_take, take};
use arrow2::datatypes::{DataType, Field, Schema};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{FlattenError, Result};
use crate::outputs::{parse_outputs, OutputValue};
use crate::table::Table;

pub const DEFAULT_OUTPUTS_COLUMN: &str = "OUTPUTS";
pub const ADDRESS_COLUMN: &str = "ADDRESS";
pub const VALUE_COLUMN: &str = "VALUE";

/// What to do with an `OUTPUTS` cell that is not a JSON array.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    /// Abort the whole run.
    #[default]
    Fail,
    /// Treat the cell as an empty list and keep going.
    Skip,
}

/// Arrow type of the `VALUE` column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// `Float64` if any parsed element carries a fractional value, including
    /// elements later dropped for having no address; `Int64` otherwise. A
    /// column with no values at all is `Float64`.
    #[default]
    Auto,
    Int64,
    Float64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FlattenOptions {
    pub outputs_column: String,
    pub on_malformed: MalformedPolicy,
    pub value_type: ValueType,
}

impl Default for FlattenOptions {
    fn default() -> Self {
        Self {
            outputs_column: DEFAULT_OUTPUTS_COLUMN.to_string(),
            on_malformed: MalformedPolicy::default(),
            value_type: ValueType::default(),
        }
    }
}

/// Row accounting for one flatten call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlattenReport {
    pub input_rows: usize,
    /// Rows whose outputs cell was SQL null.
    pub null_outputs: usize,
    pub skipped_malformed: usize,
    /// Array elements seen across all parsed cells.
    pub elements: usize,
    pub dropped_null_address: usize,
    /// Elements whose `value` was not a JSON number (numeric strings are
    /// parsed, anything else becomes null).
    pub coerced_values: usize,
    pub output_rows: usize,
}

impl fmt::Display for FlattenReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} input rows -> {} output rows ({} elements, {} without address, {} null cells, {} malformed skipped, {} coerced values)",
            self.input_rows,
            self.output_rows,
            self.elements,
            self.dropped_null_address,
            self.null_outputs,
            self.skipped_malformed,
            self.coerced_values
        )
    }
}

/// Surviving elements, in input order, with the row each came from.
#[derive(Debug, Default)]
struct Exploded {
    parents: Vec<u64>,
    addresses: Vec<String>,
    values: Vec<Option<OutputValue>>,
    /// Any parsed element, surviving or not, had a fractional value.
    saw_float: bool,
}

fn explode<'a>(
    cells: impl Iterator<Item = Option<&'a str>>,
    policy: MalformedPolicy,
    report: &mut FlattenReport,
) -> Result<Exploded> {
    let mut out = Exploded::default();

    for (row, cell) in cells.enumerate() {
        report.input_rows += 1;

        let Some(text) = cell else {
            report.null_outputs += 1;
            continue;
        };

        let outputs = match parse_outputs(text) {
            Ok(outputs) => outputs,
            Err(source) => match policy {
                MalformedPolicy::Fail => {
                    return Err(FlattenError::MalformedOutputs { row, source });
                }
                MalformedPolicy::Skip => {
                    warn!(row, error = %source, "skipping malformed outputs cell");
                    report.skipped_malformed += 1;
                    continue;
                }
            },
        };

        for output in outputs {
            report.elements += 1;
            if output.value_coerced {
                report.coerced_values += 1;
                debug!(row, value = ?output.value, "outputs value was not a JSON number");
            }
            if matches!(output.value, Some(OutputValue::Float(_))) {
                out.saw_float = true;
            }
            match output.address {
                Some(address) => {
                    out.parents.push(row as u64);
                    out.addresses.push(address);
                    out.values.push(output.value);
                }
                None => report.dropped_null_address += 1,
            }
        }
    }

    Ok(out)
}

fn explode_column(
    array: &dyn Array,
    name: &str,
    policy: MalformedPolicy,
    report: &mut FlattenReport,
) -> Result<Exploded> {
    match array.data_type() {
        DataType::Utf8 => {
            let strings = downcast::<Utf8Array<i32>>(array, name)?;
            explode(strings.iter(), policy, report)
        }
        DataType::LargeUtf8 => {
            let strings = downcast::<Utf8Array<i64>>(array, name)?;
            explode(strings.iter(), policy, report)
        }
        DataType::Null => explode(std::iter::repeat(None).take(array.len()), policy, report),
        other => Err(FlattenError::UnsupportedColumnType {
            name: name.to_string(),
            data_type: other.clone(),
        }),
    }
}

fn downcast<'a, T: 'static>(array: &'a dyn Array, name: &str) -> Result<&'a T> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| FlattenError::UnsupportedColumnType {
            name: name.to_string(),
            data_type: array.data_type().clone(),
        })
}

fn value_column(
    values: &[Option<OutputValue>],
    saw_float: bool,
    value_type: ValueType,
) -> Result<Box<dyn Array>> {
    let as_int = match value_type {
        ValueType::Int64 => true,
        ValueType::Float64 => false,
        ValueType::Auto => !saw_float && values.iter().any(Option::is_some),
    };

    if as_int {
        let mut ints = Vec::with_capacity(values.len());
        for (row, value) in values.iter().enumerate() {
            match value {
                Some(v) => ints.push(Some(v.as_i64().ok_or(FlattenError::NonIntegerValue { row })?)),
                None => ints.push(None),
            }
        }
        Ok(Int64Array::from(ints).boxed())
    } else {
        let floats: Vec<Option<f64>> = values.iter().map(|v| v.map(OutputValue::as_f64)).collect();
        Ok(Float64Array::from(floats).boxed())
    }
}

/// Repeats rows of `array` in `parents` order.
///
/// `take` has no kernel for a few types (fixed-size binary, map, union);
/// those are copied row by row through a growable instead.
fn gather(array: &dyn Array, parents: &[u64], indices: &PrimitiveArray<u64>) -> Result<Box<dyn Array>> {
    if can_take(array.data_type()) {
        return Ok(take(array, indices)?);
    }
    let mut growable = make_growable(&[array], true, parents.len());
    for &row in parents {
        growable.extend(0, row as usize, 1);
    }
    Ok(growable.as_box())
}

/// Flattens `input` into one row per transaction output with an address.
///
/// Output columns are the input's columns minus the outputs column, in their
/// original order, followed by `ADDRESS` and `VALUE`; every name is
/// uppercased. Output rows follow input row order and, within a row, array
/// order.
pub fn flatten(input: &Table, options: &FlattenOptions) -> Result<(Table, FlattenReport)> {
    let outputs_idx = input
        .column_index(&options.outputs_column)
        .ok_or_else(|| FlattenError::MissingColumn(options.outputs_column.clone()))?;

    let mut report = FlattenReport::default();
    let exploded = explode_column(
        input.chunk().arrays()[outputs_idx].as_ref(),
        &options.outputs_column,
        options.on_malformed,
        &mut report,
    )?;
    report.output_rows = exploded.parents.len();

    let indices = PrimitiveArray::<u64>::from_vec(exploded.parents.clone());

    let mut seen = AHashSet::new();
    let mut fields = Vec::with_capacity(input.num_columns() + 1);
    let mut arrays = Vec::with_capacity(input.num_columns() + 1);

    for (i, (field, array)) in input.fields().iter().zip(input.chunk().arrays()).enumerate() {
        if i == outputs_idx {
            continue;
        }
        let mut field = field.clone();
        field.name = field.name.to_uppercase();
        if !seen.insert(field.name.clone()) {
            return Err(FlattenError::DuplicateColumn(field.name));
        }
        arrays.push(gather(array.as_ref(), &exploded.parents, &indices)?);
        fields.push(field);
    }

    for name in [ADDRESS_COLUMN, VALUE_COLUMN] {
        if !seen.insert(name.to_string()) {
            return Err(FlattenError::DuplicateColumn(name.to_string()));
        }
    }

    let values = value_column(&exploded.values, exploded.saw_float, options.value_type)?;
    fields.push(Field::new(ADDRESS_COLUMN, DataType::Utf8, false));
    arrays.push(Utf8Array::<i32>::from_slice(&exploded.addresses).boxed());
    fields.push(Field::new(VALUE_COLUMN, values.data_type().clone(), true));
    arrays.push(values);

    let schema = Schema::from(fields).with_metadata(input.schema().metadata.clone());
    let table = Table::try_new(schema, arrays)?;

    debug!(%report, "flattened outputs column {:?}", options.outputs_column);
    Ok((table, report))
}
