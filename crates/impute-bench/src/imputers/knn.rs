//! Fit/transform k-NN imputation.
//!
//! [`KnnImputer`] remembers the rows it was fitted on and fills each missing
//! cell from the nearest of them under the NaN-Euclidean distance, either as
//! a plain mean or weighted by inverse distance.

use super::{Imputer, nan_euclidean, param_count};
use crate::error::{BenchError, Result};
use crate::types::Table;
use crate::utils::{RowMatrix, column_names, frame_to_rows, rows_to_frame};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How neighbor values are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KnnWeights {
    /// Plain mean of the neighbors
    Uniform,
    /// Mean weighted by inverse distance
    Distance,
}

/// Training rows remembered by [`KnnImputer::fit`].
#[derive(Debug, Clone)]
struct FittedRows {
    columns: Vec<String>,
    rows: RowMatrix,
}

/// Fit/transform k-NN imputer.
///
/// Every missing cell of the transformed table is filled from the
/// `n_neighbors` fitted rows closest to its row that have the cell's column
/// present.
#[derive(Debug, Clone)]
pub struct KnnImputer {
    n_neighbors: usize,
    weights: KnnWeights,
    fitted: Option<FittedRows>,
}

impl KnnImputer {
    /// `n_neighbors` is clamped to at least 1.
    pub fn new(n_neighbors: usize, weights: KnnWeights) -> Self {
        Self {
            n_neighbors: n_neighbors.max(1),
            weights,
            fitted: None,
        }
    }

    pub fn n_neighbors(&self) -> usize {
        self.n_neighbors
    }

    pub fn weights(&self) -> KnnWeights {
        self.weights
    }

    /// Override a hyperparameter by name.
    pub fn set_param(&mut self, name: &str, value: f64) -> Result<()> {
        match name {
            "n_neighbors" => {
                self.n_neighbors = param_count(name, value)?;
                Ok(())
            }
            _ => Err(BenchError::UnknownParameter {
                name: name.to_string(),
                target: self.name().to_string(),
            }),
        }
    }

    /// Fill `target_col` of `query` from its nearest fitted rows.
    fn impute_value(&self, fitted: &FittedRows, query: &[Option<f64>], target_col: usize) -> Result<f64> {
        // Fitted rows with the target present and at least one comparable feature
        let mut distances: Vec<(f64, f64)> = fitted
            .rows
            .iter()
            .filter_map(|row| {
                let value = row[target_col]?;
                let distance = nan_euclidean(query, row, Some(target_col));
                distance.is_finite().then_some((distance, value))
            })
            .collect();

        if distances.is_empty() {
            return column_mean(&fitted.rows, target_col).ok_or_else(|| {
                BenchError::ImputationFailed {
                    column: fitted.columns[target_col].clone(),
                    reason: "no observed values in fitted data".to_string(),
                }
            });
        }

        distances.sort_by(|a, b| a.0.total_cmp(&b.0));
        let nearest = &distances[..self.n_neighbors.min(distances.len())];

        let value = match self.weights {
            KnnWeights::Uniform => {
                nearest.iter().map(|(_, v)| v).sum::<f64>() / nearest.len() as f64
            }
            KnnWeights::Distance => distance_weighted_mean(nearest),
        };

        Ok(value)
    }
}

/// Mean of `(distance, value)` pairs weighted by `1 / distance`.
///
/// Neighbors whose weight is infinite (zero or subnormal distance) are exact
/// matches; when any exist, their plain mean is returned instead.
fn distance_weighted_mean(nearest: &[(f64, f64)]) -> f64 {
    let exact: Vec<f64> = nearest
        .iter()
        .filter(|(d, _)| (1.0 / d).is_infinite())
        .map(|(_, v)| *v)
        .collect();
    if !exact.is_empty() {
        return exact.iter().sum::<f64>() / exact.len() as f64;
    }

    let (weighted_sum, weight_sum) = nearest
        .iter()
        .fold((0.0, 0.0), |(ws, w), (d, v)| (ws + v / d, w + 1.0 / d));
    weighted_sum / weight_sum
}

fn column_mean(rows: &[Vec<Option<f64>>], col: usize) -> Option<f64> {
    let (sum, count) = rows
        .iter()
        .filter_map(|row| row[col])
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

impl Imputer for KnnImputer {
    fn name(&self) -> &'static str {
        match self.weights {
            KnnWeights::Uniform => "kNN",
            KnnWeights::Distance => "WkNN",
        }
    }

    fn fit(&mut self, table: &Table) -> Result<()> {
        if table.height() == 0 {
            return Err(BenchError::InvalidConfig(
                "cannot fit a k-NN imputer on an empty table".to_string(),
            ));
        }
        let columns = column_names(table);
        let rows = frame_to_rows(table, &columns)?;
        debug!("KNN imputer fitted on {} rows", rows.len());
        self.fitted = Some(FittedRows { columns, rows });
        Ok(())
    }

    fn transform(&self, table: &Table) -> Result<Table> {
        let fitted = self.fitted.as_ref().ok_or(BenchError::NotFitted)?;
        let mut rows = frame_to_rows(table, &fitted.columns)?;

        let mut imputed = 0usize;
        for row in rows.iter_mut() {
            let query = row.clone();
            for (col_idx, cell) in row.iter_mut().enumerate() {
                if cell.is_none() {
                    *cell = Some(self.impute_value(fitted, &query, col_idx)?);
                    imputed += 1;
                }
            }
        }

        debug!("KNN imputed {} cells", imputed);
        rows_to_frame(&fitted.columns, &rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn value_at(df: &DataFrame, column: &str, row: usize) -> f64 {
        df.column(column)
            .unwrap()
            .get(row)
            .unwrap()
            .try_extract::<f64>()
            .unwrap()
    }

    // ========================================================================
    // KnnImputer::new() / set_param() tests
    // ========================================================================

    #[test]
    fn test_knn_imputer_new_with_zero_neighbors_defaults_to_one() {
        let imputer = KnnImputer::new(0, KnnWeights::Uniform);
        assert_eq!(imputer.n_neighbors(), 1);
    }

    #[test]
    fn test_set_param_n_neighbors() {
        let mut imputer = KnnImputer::new(5, KnnWeights::Uniform);
        imputer.set_param("n_neighbors", 3.0).unwrap();
        assert_eq!(imputer.n_neighbors(), 3);
        assert!(imputer.set_param("n_neighbors", 0.0).is_err());
        assert!(matches!(
            imputer.set_param("leaf_size", 30.0),
            Err(BenchError::UnknownParameter { .. })
        ));
    }

    // ========================================================================
    // fit() / transform() tests
    // ========================================================================

    #[test]
    fn test_transform_before_fit_fails() {
        let imputer = KnnImputer::new(2, KnnWeights::Uniform);
        let df = df!["a" => [1.0]].unwrap();
        assert!(matches!(imputer.transform(&df), Err(BenchError::NotFitted)));
    }

    #[test]
    fn test_fit_transform_basic_imputation() {
        let mut imputer = KnnImputer::new(2, KnnWeights::Uniform);

        let df = df![
            "height" => [1.0, 2.0, 3.0, 4.0, 5.0],
            "weight" => [Some(10.0), Some(20.0), None, Some(40.0), Some(50.0)],
        ]
        .unwrap();

        let result = imputer.fit_transform(&df).unwrap();
        assert_eq!(result.column("weight").unwrap().null_count(), 0);

        // Rows 1 and 3 are both at distance 1
        assert_eq!(value_at(&result, "weight", 2), 30.0);
    }

    #[test]
    fn test_fit_on_complete_rows_transform_other_table() {
        let mut imputer = KnnImputer::new(1, KnnWeights::Uniform);
        let train = df![
            "a" => [1.0, 2.0, 3.0],
            "b" => [10.0, 20.0, 30.0],
        ]
        .unwrap();
        let query = df![
            "a" => [Some(2.9), None],
            "b" => [None, Some(11.0)],
        ]
        .unwrap();

        imputer.fit(&train).unwrap();
        let result = imputer.transform(&query).unwrap();
        assert_eq!(value_at(&result, "b", 0), 30.0);
        assert_eq!(value_at(&result, "a", 1), 1.0);
    }

    #[test]
    fn test_distance_weights_favor_closer_neighbor() {
        let mut imputer = KnnImputer::new(2, KnnWeights::Distance);
        let df = df![
            "height" => [1.0, 1.1, 10.0],
            "weight" => [Some(10.0), None, Some(100.0)],
        ]
        .unwrap();

        let result = imputer.fit_transform(&df).unwrap();
        assert!(value_at(&result, "weight", 1) < 30.0);
    }

    #[test]
    fn test_distance_weights_zero_distance_uses_exact_match() {
        let mut imputer = KnnImputer::new(2, KnnWeights::Distance);
        let df = df![
            "height" => [5.0, 5.0, 100.0],
            "weight" => [Some(10.0), None, Some(1000.0)],
        ]
        .unwrap();

        let result = imputer.fit_transform(&df).unwrap();
        assert_eq!(value_at(&result, "weight", 1), 10.0);
    }

    #[test]
    fn test_distance_weighted_mean_subnormal_distance_is_exact() {
        // 1 / 5e-324 overflows to infinity.
        let value = distance_weighted_mean(&[(5e-324, 10.0), (1.0, 20.0)]);
        assert!(!value.is_nan());
        assert_eq!(value, 10.0);
    }

    #[test]
    fn test_distance_weighted_mean_inverse_distance() {
        let value = distance_weighted_mean(&[(1.0, 10.0), (2.0, 40.0)]);
        // weights 1 and 0.5
        assert!((value - (10.0 + 20.0) / 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_no_comparable_neighbors_falls_back_to_mean() {
        let mut imputer = KnnImputer::new(2, KnnWeights::Uniform);
        let df = df![
            "a" => [Some(1.0), Some(3.0), None],
            "b" => [Some(10.0), Some(20.0), None],
        ]
        .unwrap();

        let result = imputer.fit_transform(&df).unwrap();
        assert_eq!(value_at(&result, "a", 2), 2.0);
        assert_eq!(value_at(&result, "b", 2), 15.0);
    }

    #[test]
    fn test_all_nulls_in_column_fails() {
        let mut imputer = KnnImputer::new(3, KnnWeights::Uniform);
        let df = df![
            "height" => [1.0, 2.0, 3.0],
            "weight" => [Option::<f64>::None, None, None],
        ]
        .unwrap();

        assert!(matches!(
            imputer.fit_transform(&df),
            Err(BenchError::ImputationFailed { .. })
        ));
    }

    #[test]
    fn test_fit_empty_table_fails() {
        let mut imputer = KnnImputer::new(3, KnnWeights::Uniform);
        let df = df!["a" => Vec::<f64>::new()].unwrap();
        assert!(imputer.fit(&df).is_err());
    }

    #[test]
    fn test_n_neighbors_greater_than_rows_uses_all() {
        let mut imputer = KnnImputer::new(10, KnnWeights::Uniform);
        let df = df![
            "height" => [1.0, 2.0, 3.0],
            "weight" => [Some(10.0), None, Some(30.0)],
        ]
        .unwrap();

        let result = imputer.fit_transform(&df).unwrap();
        assert_eq!(value_at(&result, "weight", 1), 20.0);
    }
}
