//! Shared utilities for moving data between polars tables and plain matrices.
//!
//! The numeric routines work on row-major `Vec<Vec<Option<f64>>>` matrices where
//! `None` marks a missing cell; these helpers convert in both directions.

use crate::error::{BenchError, Result};
use polars::prelude::*;

/// A row-major matrix of optional cells.
pub type RowMatrix = Vec<Vec<Option<f64>>>;

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Column names of a table, in order.
pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names().iter().map(|s| s.to_string()).collect()
}

/// Read one column as `f64` cells.
///
/// Nulls and NaN both come back as `None`. Fails for unknown or non-numeric columns.
pub fn column_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df
        .column(name)
        .map_err(|_| BenchError::ColumnNotFound(name.to_string()))?;

    if !is_numeric_dtype(column.dtype()) {
        return Err(BenchError::InvalidConfig(format!(
            "column '{}' has non-numeric type {}; label-encode it first",
            name,
            column.dtype()
        )));
    }

    let float_series = column.as_materialized_series().cast(&DataType::Float64)?;
    let values = float_series
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect();
    Ok(values)
}

/// Build a row-major matrix from the given columns.
pub fn frame_to_rows(df: &DataFrame, columns: &[String]) -> Result<RowMatrix> {
    let n_rows = df.height();
    let mut matrix = vec![vec![None; columns.len()]; n_rows];

    for (col_idx, col_name) in columns.iter().enumerate() {
        let values = column_values(df, col_name)?;
        for (row, value) in matrix.iter_mut().zip(values) {
            row[col_idx] = value;
        }
    }

    Ok(matrix)
}

/// Build a `Float64` table from a row-major matrix.
pub fn rows_to_frame(columns: &[String], rows: &[Vec<Option<f64>>]) -> Result<DataFrame> {
    let series: Vec<Column> = columns
        .iter()
        .enumerate()
        .map(|(col_idx, name)| {
            let values: Vec<Option<f64>> = rows.iter().map(|row| row[col_idx]).collect();
            Column::new(name.as_str().into(), values)
        })
        .collect();

    Ok(DataFrame::new(series)?)
}

/// Keep only the rows at `indices`, in the given order.
pub fn select_rows(rows: &[Vec<Option<f64>>], indices: &[usize]) -> RowMatrix {
    indices.iter().map(|&i| rows[i].clone()).collect()
}

/// Position of `name` in `columns`.
pub fn column_position(columns: &[String], name: &str) -> Result<usize> {
    columns
        .iter()
        .position(|c| c == name)
        .ok_or_else(|| BenchError::ColumnNotFound(name.to_string()))
}
