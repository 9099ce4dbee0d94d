//! Scoring imputed tables against ground truth.
//!
//! [`ComparisonScorer::score`] only looks at the cells that were actually
//! imputed, as recorded in a [`MissingColumnMap`].
//! [`ComparisonScorer::compare_imputations`] compares whole columns.
//! [`ImputationResult`] is the paired real/imputed view the sweep reduces to
//! per-column squared error.

use crate::error::{BenchError, Result};
use crate::types::{ColumnScore, MissingColumnMap, Table};
use crate::utils::{column_names, column_values};
use polars::prelude::*;
use std::collections::HashMap;

/// Name of the column recording which original column a row had imputed.
pub const IMPUTED_COLUMN: &str = "imputed";

pub fn real_column_name(column: &str) -> String {
    format!("{} (real)", column)
}

pub fn imputed_column_name(column: &str) -> String {
    format!("{} (imputed)", column)
}

// ============================================================================
// Metric reducers
// ============================================================================

fn check_pairs(actual: &[f64], predicted: &[f64]) -> Result<()> {
    if actual.len() != predicted.len() {
        return Err(BenchError::InvariantViolation(format!(
            "{} actual values but {} predictions",
            actual.len(),
            predicted.len()
        )));
    }
    if actual.is_empty() {
        return Err(BenchError::DegenerateComputation(
            "cannot compute an error metric over zero values".to_string(),
        ));
    }
    Ok(())
}

pub fn mean_squared_error(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    check_pairs(actual, predicted)?;
    let sum: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p) * (a - p))
        .sum();
    Ok(sum / actual.len() as f64)
}

pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    check_pairs(actual, predicted)?;
    let sum: f64 = actual.iter().zip(predicted).map(|(a, p)| (a - p).abs()).sum();
    Ok(sum / actual.len() as f64)
}

pub fn root_mean_squared_error(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    Ok(mean_squared_error(actual, predicted)?.sqrt())
}

/// Running squared and absolute error for one column.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ErrorAccumulator {
    count: usize,
    squared_sum: f64,
    absolute_sum: f64,
}

impl ErrorAccumulator {
    pub fn push(&mut self, real: f64, imputed: f64) {
        let diff = real - imputed;
        self.count += 1;
        self.squared_sum += diff * diff;
        self.absolute_sum += diff.abs();
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Mean squared error, 0 when nothing was pushed.
    pub fn mse(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.squared_sum / self.count as f64
        }
    }

    pub fn rmse(&self) -> f64 {
        self.mse().sqrt()
    }

    pub fn mae(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.absolute_sum / self.count as f64
        }
    }

    fn into_score(self, column: &str) -> ColumnScore {
        ColumnScore {
            column: column.to_string(),
            count: self.count,
            mse: self.mse(),
            rmse: self.rmse(),
            mae: self.mae(),
        }
    }
}

fn cell(values: &[Option<f64>], row: usize, column: &str, what: &str) -> Result<f64> {
    match values.get(row) {
        Some(Some(v)) => Ok(*v),
        Some(None) => Err(BenchError::ImputationFailed {
            column: column.to_string(),
            reason: format!("{} value missing at row {}", what, row),
        }),
        None => Err(BenchError::InvariantViolation(format!(
            "row {} is outside the {} table for '{}'",
            row, what, column
        ))),
    }
}

// ============================================================================
// ComparisonScorer
// ============================================================================

pub struct ComparisonScorer;

impl ComparisonScorer {
    /// MSE, RMSE and MAE per column, restricted to the cells named by `index_to_column`.
    ///
    /// Columns come back in the real table's order; columns that were never
    /// imputed are left out.
    pub fn score(
        real: &Table,
        imputed: &Table,
        index_to_column: &MissingColumnMap,
    ) -> Result<Vec<ColumnScore>> {
        let mut rows_by_column: HashMap<&str, Vec<usize>> = HashMap::new();
        for (row, column) in index_to_column {
            rows_by_column.entry(column.as_str()).or_default().push(*row);
        }

        let mut scores = Vec::new();
        for column in column_names(real) {
            let Some(rows) = rows_by_column.remove(column.as_str()) else {
                continue;
            };
            let real_values = column_values(real, &column)?;
            let imputed_values = column_values(imputed, &column)?;

            let mut acc = ErrorAccumulator::default();
            for row in rows {
                acc.push(
                    cell(&real_values, row, &column, "real")?,
                    cell(&imputed_values, row, &column, "imputed")?,
                );
            }
            scores.push(acc.into_score(&column));
        }

        if let Some(column) = rows_by_column.keys().next() {
            return Err(BenchError::ColumnNotFound(column.to_string()));
        }
        Ok(scores)
    }

    /// MSE, RMSE and MAE per column over every row of both tables.
    pub fn compare_imputations(real: &Table, imputed: &Table) -> Result<Vec<ColumnScore>> {
        if real.height() != imputed.height() {
            return Err(BenchError::InvariantViolation(format!(
                "real table has {} rows, imputed table {}",
                real.height(),
                imputed.height()
            )));
        }

        column_names(real)
            .iter()
            .map(|column| {
                let real_values = column_values(real, column)?;
                let imputed_values = column_values(imputed, column)?;
                let mut acc = ErrorAccumulator::default();
                for row in 0..real_values.len() {
                    acc.push(
                        cell(&real_values, row, column, "real")?,
                        cell(&imputed_values, row, column, "imputed")?,
                    );
                }
                Ok(acc.into_score(column))
            })
            .collect()
    }

    /// Scores as a table with `Column`, `MSE`, `RMSE` and `MAE` columns.
    pub fn to_frame(scores: &[ColumnScore]) -> Result<Table> {
        let frame = df![
            "Column" => scores.iter().map(|s| s.column.as_str()).collect::<Vec<_>>(),
            "MSE" => scores.iter().map(|s| s.mse).collect::<Vec<_>>(),
            "RMSE" => scores.iter().map(|s| s.rmse).collect::<Vec<_>>(),
            "MAE" => scores.iter().map(|s| s.mae).collect::<Vec<_>>(),
        ]?;
        Ok(frame)
    }
}

// ============================================================================
// ImputationResult
// ============================================================================

/// Real and imputed values side by side for the rows that had a missing cell.
///
/// For every original column `c` the table holds `"c (real)"` and
/// `"c (imputed)"`, plus an `"imputed"` column naming the column that was
/// reconstructed in that row. Rows follow the ascending row index of the
/// missing map.
#[derive(Debug, Clone)]
pub struct ImputationResult {
    table: Table,
    columns: Vec<String>,
}

impl ImputationResult {
    pub fn assemble(truth: &Table, imputed: &Table, missing: &MissingColumnMap) -> Result<Self> {
        let columns = column_names(truth);
        let rows: Vec<usize> = missing.keys().copied().collect();
        let mut parts = Vec::with_capacity(2 * columns.len() + 1);

        for column in &columns {
            let real_values = column_values(truth, column)?;
            let imputed_values = column_values(imputed, column)?;
            let pick = |values: &[Option<f64>]| -> Result<Vec<Option<f64>>> {
                rows.iter()
                    .map(|&r| {
                        values.get(r).copied().ok_or_else(|| {
                            BenchError::InvariantViolation(format!(
                                "missing-map row {} is outside the table",
                                r
                            ))
                        })
                    })
                    .collect()
            };
            parts.push(Column::new(
                real_column_name(column).into(),
                pick(&real_values)?,
            ));
            parts.push(Column::new(
                imputed_column_name(column).into(),
                pick(&imputed_values)?,
            ));
        }

        let imputed_names: Vec<&str> = missing.values().map(String::as_str).collect();
        parts.push(Column::new(IMPUTED_COLUMN.into(), imputed_names));

        Ok(Self {
            table: DataFrame::new(parts)?,
            columns,
        })
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn into_table(self) -> Table {
        self.table
    }

    /// Original column names, in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Mean squared error per original column over the rows where it was the
    /// imputed one; 0 for a column that never was.
    pub fn imputed_squared_error(&self) -> Result<Vec<(String, f64)>> {
        let imputed_names = self.table.column(IMPUTED_COLUMN)?.str()?;

        if let Some(unknown) = imputed_names
            .into_iter()
            .flatten()
            .find(|name| !self.columns.iter().any(|c| c == name))
        {
            return Err(BenchError::ColumnNotFound(unknown.to_string()));
        }

        let mut errors = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let real = column_values(&self.table, &real_column_name(column))?;
            let imputed = column_values(&self.table, &imputed_column_name(column))?;

            let mut acc = ErrorAccumulator::default();
            for (row, name) in imputed_names.into_iter().enumerate() {
                if name == Some(column.as_str()) {
                    acc.push(
                        cell(&real, row, column, "real")?,
                        cell(&imputed, row, column, "imputed")?,
                    );
                }
            }
            errors.push((column.clone(), acc.mse()));
        }

        Ok(errors)
    }
}
