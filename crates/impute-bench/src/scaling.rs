//! Min-max scaling around distance-sensitive imputers.
//!
//! A [`Scaler`] records each column's range once, from a reference table, and
//! maps any table into and back out of that range. Values outside the
//! reference range extrapolate linearly.

use crate::error::{BenchError, Result};
use crate::types::Table;
use crate::utils::is_numeric_dtype;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Observed bounds of one column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnRange {
    pub max: f64,
    pub min: f64,
    pub range: f64,
}

/// Per-column min-max bounds, fixed at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    ranges: Vec<(String, ColumnRange)>,
}

static_assertions::assert_impl_all!(Scaler: Send, Sync);

impl Scaler {
    /// Record `(max, min, max - min)` for each of `columns` in `table`.
    ///
    /// A constant column fails with [`BenchError::ZeroRange`].
    pub fn build<S: AsRef<str>>(table: &Table, columns: &[S]) -> Result<Self> {
        let mut ranges = Vec::with_capacity(columns.len());

        for name in columns {
            let name = name.as_ref();
            let floats = float_column(table, name)?;
            let ca = floats.f64()?;

            let (Some(min), Some(max)) = (ca.min(), ca.max()) else {
                return Err(BenchError::DegenerateComputation(format!(
                    "column '{}' has no values to scale",
                    name
                )));
            };
            let range = max - min;
            if range == 0.0 {
                return Err(BenchError::ZeroRange(name.to_string()));
            }

            debug!("Scaling '{}' over [{}, {}]", name, min, max);
            ranges.push((name.to_string(), ColumnRange { max, min, range }));
        }

        Ok(Self { ranges })
    }

    /// Build over every column of `table`.
    pub fn build_all(table: &Table) -> Result<Self> {
        let columns: Vec<String> = table
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        Self::build(table, &columns)
    }

    pub fn range(&self, column: &str) -> Option<&ColumnRange> {
        self.ranges
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, range)| range)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.ranges.iter().map(|(name, _)| name.as_str())
    }

    /// Map every scaled column onto `(x - min) / range`.
    pub fn apply(&self, table: &Table) -> Result<Table> {
        self.map_columns(table, |x, r| (x - r.min) / r.range)
    }

    /// Exact inverse of [`Scaler::apply`]: `x * range + min`.
    pub fn invert(&self, table: &Table) -> Result<Table> {
        self.map_columns(table, |x, r| x * r.range + r.min)
    }

    fn map_columns(&self, table: &Table, f: impl Fn(f64, &ColumnRange) -> f64) -> Result<Table> {
        let mut result = table.clone();
        for (name, range) in &self.ranges {
            let floats = float_column(table, name)?;
            let mapped = floats.f64()?.apply(|v| v.map(|x| f(x, range)));
            result.with_column(mapped.into_series().with_name(name.as_str().into()))?;
        }
        Ok(result)
    }
}

fn float_column(table: &Table, name: &str) -> Result<Series> {
    let column = table
        .column(name)
        .map_err(|_| BenchError::ColumnNotFound(name.to_string()))?;
    if !is_numeric_dtype(column.dtype()) {
        return Err(BenchError::InvalidConfig(format!(
            "cannot scale non-numeric column '{}'",
            name
        )));
    }
    Ok(column.as_materialized_series().cast(&DataType::Float64)?)
}
