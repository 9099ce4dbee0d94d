//! Iterative imputer (chained equations).
//!
//! Each column is modelled as a regression on every other column. Missing
//! cells start at the fitted column means and are re-predicted column by
//! column, round after round, until the largest change drops below
//! `tol` times the largest observed magnitude or `max_iter` rounds have run.

use super::{Estimator, Imputer, param_count, param_index, param_positive};
use crate::error::{BenchError, Result};
use crate::types::Table;
use crate::utils::{RowMatrix, column_names, frame_to_rows, rows_to_frame};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Per-column models learned by [`IterativeImputer::fit`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FittedChain {
    columns: Vec<String>,
    means: Vec<f64>,
    models: Vec<Estimator>,
}

/// Iterative imputer (generalization of MICE)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterativeImputer {
    /// Maximum imputation rounds
    max_iter: usize,
    /// Convergence tolerance
    tol: f64,
    /// Seed handed to estimators that have none
    random_state: u64,
    /// Unfitted estimator cloned for every column
    estimator: Estimator,
    fitted: Option<FittedChain>,
}

static_assertions::assert_impl_all!(IterativeImputer: Send, Sync);

/// Dense matrix with the positions of its originally missing cells.
struct Working {
    values: Array2<f64>,
    /// Missing row indices, per column
    missing: Vec<Vec<usize>>,
    /// Largest observed magnitude, the scale for the stopping rule
    scale: f64,
}

impl Working {
    fn from_rows(rows: &RowMatrix, means: &[f64]) -> Self {
        let n_cols = means.len();
        let mut values = Array2::<f64>::zeros((rows.len(), n_cols));
        let mut missing = vec![Vec::new(); n_cols];
        let mut scale = 0.0_f64;

        for (i, row) in rows.iter().enumerate() {
            for (j, cell) in row.iter().enumerate() {
                match cell {
                    Some(v) => {
                        values[[i, j]] = *v;
                        scale = scale.max(v.abs());
                    }
                    None => {
                        values[[i, j]] = means[j];
                        missing[j].push(i);
                    }
                }
            }
        }

        Self {
            values,
            missing,
            scale,
        }
    }

    fn has_missing(&self) -> bool {
        self.missing.iter().any(|rows| !rows.is_empty())
    }

    fn observed_rows(&self, col: usize) -> Vec<usize> {
        let missing = &self.missing[col];
        (0..self.values.nrows())
            .filter(|r| missing.binary_search(r).is_err())
            .collect()
    }

    /// Every column except `skip`, restricted to `rows`.
    fn predictors(&self, rows: &[usize], skip: usize) -> Array2<f64> {
        let n_pred = self.values.ncols().saturating_sub(1);
        Array2::from_shape_fn((rows.len(), n_pred), |(i, j)| {
            let col = if j < skip { j } else { j + 1 };
            self.values[[rows[i], col]]
        })
    }

    fn target(&self, rows: &[usize], col: usize) -> Array1<f64> {
        rows.iter().map(|&r| self.values[[r, col]]).collect()
    }

    /// Overwrite the missing cells of `col` with predictions from `model`.
    ///
    /// Returns the largest absolute change.
    fn refill(&mut self, model: &Estimator, col: usize) -> Result<f64> {
        let rows = &self.missing[col];
        if rows.is_empty() {
            return Ok(0.0);
        }
        let predictions = model.predict(&self.predictors(rows, col))?;

        let mut max_delta = 0.0_f64;
        for (&row, &pred) in self.missing[col].iter().zip(predictions.iter()) {
            let delta = (self.values[[row, col]] - pred).abs();
            max_delta = max_delta.max(delta);
            self.values[[row, col]] = pred;
        }
        Ok(max_delta)
    }

    fn into_rows(self) -> RowMatrix {
        self.values
            .rows()
            .into_iter()
            .map(|row| row.iter().map(|v| Some(*v)).collect())
            .collect()
    }
}

impl IterativeImputer {
    /// Create new iterative imputer
    pub fn new(estimator: Estimator) -> Self {
        Self {
            max_iter: 10,
            tol: 1e-3,
            random_state: 0,
            estimator,
            fitted: None,
        }
    }

    pub fn estimator(&self) -> &Estimator {
        &self.estimator
    }

    pub fn max_iter(&self) -> usize {
        self.max_iter
    }

    /// Override a hyperparameter by name.
    pub fn set_param(&mut self, name: &str, value: f64) -> Result<()> {
        match name {
            "max_iter" => self.max_iter = param_count(name, value)?,
            "tol" => self.tol = param_positive(name, value)?,
            "random_state" => self.random_state = param_index(name, value)?,
            _ => {
                return Err(BenchError::UnknownParameter {
                    name: name.to_string(),
                    target: self.name().to_string(),
                });
            }
        }
        Ok(())
    }

    fn fit_column(&self, working: &Working, col: usize) -> Result<Estimator> {
        let rows = working.observed_rows(col);
        let x = working.predictors(&rows, col);
        let y = working.target(&rows, col);

        let mut model = self.estimator.clone();
        model.seed_if_unset(self.random_state.wrapping_add(col as u64));
        model.fit(&x, &y)?;
        Ok(model)
    }

    fn converged(&self, max_delta: f64, scale: f64) -> bool {
        max_delta < self.tol * scale
    }
}

fn observed_means(columns: &[String], rows: &RowMatrix) -> Result<Vec<f64>> {
    (0..columns.len())
        .map(|j| {
            let (sum, count) = rows
                .iter()
                .filter_map(|row| row[j])
                .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
            if count == 0 {
                Err(BenchError::ImputationFailed {
                    column: columns[j].clone(),
                    reason: "no observed values in fitted data".to_string(),
                })
            } else {
                Ok(sum / count as f64)
            }
        })
        .collect()
}

impl Imputer for IterativeImputer {
    fn name(&self) -> &'static str {
        match self.estimator {
            Estimator::Linear(_) => "MICE",
            Estimator::BayesianRidge(_) => "MICE BR",
            Estimator::RandomForest(_) => "MICE RF",
        }
    }

    fn fit(&mut self, table: &Table) -> Result<()> {
        let columns = column_names(table);
        let rows = frame_to_rows(table, &columns)?;
        let means = observed_means(&columns, &rows)?;
        let mut working = Working::from_rows(&rows, &means);

        // Complete the training table itself before learning the final models
        if working.has_missing() {
            for round in 0..self.max_iter {
                let mut max_delta = 0.0_f64;
                for col in 0..columns.len() {
                    if working.missing[col].is_empty() {
                        continue;
                    }
                    let model = self.fit_column(&working, col)?;
                    max_delta = max_delta.max(working.refill(&model, col)?);
                }
                debug!("Training round {}: max change {:.6}", round + 1, max_delta);
                if self.converged(max_delta, working.scale) {
                    break;
                }
            }
        }

        let models = (0..columns.len())
            .map(|col| self.fit_column(&working, col))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            "{} fitted {} column models on {} rows",
            self.name(),
            models.len(),
            rows.len()
        );
        self.fitted = Some(FittedChain {
            columns,
            means,
            models,
        });
        Ok(())
    }

    fn transform(&self, table: &Table) -> Result<Table> {
        let fitted = self.fitted.as_ref().ok_or(BenchError::NotFitted)?;
        let rows = frame_to_rows(table, &fitted.columns)?;
        let mut working = Working::from_rows(&rows, &fitted.means);

        if working.has_missing() {
            let mut converged = false;
            for round in 0..self.max_iter {
                let mut max_delta = 0.0_f64;
                for (col, model) in fitted.models.iter().enumerate() {
                    max_delta = max_delta.max(working.refill(model, col)?);
                }
                debug!("Imputation round {}: max change {:.6}", round + 1, max_delta);
                if self.converged(max_delta, working.scale) {
                    converged = true;
                    break;
                }
            }
            if !converged {
                warn!(
                    "{} reached max_iter={} without converging",
                    self.name(),
                    self.max_iter
                );
            }
        }

        rows_to_frame(&fitted.columns, &working.into_rows())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imputers::{BayesianRidge, LinearRegression, RandomForestRegressor};
    use polars::prelude::*;

    fn value_at(df: &DataFrame, column: &str, row: usize) -> f64 {
        df.column(column)
            .unwrap()
            .get(row)
            .unwrap()
            .try_extract::<f64>()
            .unwrap()
    }

    fn linear() -> IterativeImputer {
        IterativeImputer::new(Estimator::Linear(LinearRegression::default()))
    }

    // ========================================================================
    // set_param() tests
    // ========================================================================

    #[test]
    fn test_set_param() {
        let mut imputer = linear();
        imputer.set_param("max_iter", 3.0).unwrap();
        imputer.set_param("tol", 1e-6).unwrap();
        imputer.set_param("random_state", 11.0).unwrap();
        assert_eq!(imputer.max_iter(), 3);

        assert!(imputer.set_param("max_iter", 0.0).is_err());
        assert!(matches!(
            imputer.set_param("n_neighbors", 3.0),
            Err(BenchError::UnknownParameter { .. })
        ));
    }

    #[test]
    fn test_names_follow_estimator() {
        assert_eq!(linear().name(), "MICE");
        assert_eq!(
            IterativeImputer::new(Estimator::BayesianRidge(BayesianRidge::default())).name(),
            "MICE BR"
        );
        assert_eq!(
            IterativeImputer::new(Estimator::RandomForest(RandomForestRegressor::default()))
                .name(),
            "MICE RF"
        );
    }

    // ========================================================================
    // fit() / transform() tests
    // ========================================================================

    #[test]
    fn test_transform_before_fit_fails() {
        let df = df!["a" => [1.0]].unwrap();
        assert!(matches!(linear().transform(&df), Err(BenchError::NotFitted)));
    }

    #[test]
    fn test_linear_relation_recovered_from_complete_training_rows() {
        let train = df![
            "x" => [1.0, 2.0, 3.0, 4.0, 5.0],
            "y" => [3.0, 5.0, 7.0, 9.0, 11.0],
        ]
        .unwrap();
        let query = df![
            "x" => [Some(6.0), None],
            "y" => [None, Some(1.0)],
        ]
        .unwrap();

        let mut imputer = linear();
        imputer.fit(&train).unwrap();
        let result = imputer.transform(&query).unwrap();

        assert!((value_at(&result, "y", 0) - 13.0).abs() < 1e-6);
        assert!((value_at(&result, "x", 1) - 0.0).abs() < 1e-6);
        assert_eq!(value_at(&result, "x", 0), 6.0);
    }

    #[test]
    fn test_fit_transform_fills_every_cell() {
        let df = df![
            "a" => [Some(1.0), Some(2.0), None, Some(4.0), Some(5.0), Some(6.0)],
            "b" => [Some(2.0), None, Some(6.0), Some(8.0), Some(10.0), Some(12.0)],
            "c" => [Some(1.0), Some(1.0), Some(2.0), None, Some(3.0), Some(3.0)],
        ]
        .unwrap();

        let mut imputer = linear();
        let result = imputer.fit_transform(&df).unwrap();
        for name in ["a", "b", "c"] {
            assert_eq!(result.column(name).unwrap().null_count(), 0);
        }
        assert_eq!(result.shape(), df.shape());
    }

    #[test]
    fn test_column_without_observations_fails() {
        let df = df![
            "a" => [1.0, 2.0],
            "b" => [Option::<f64>::None, None],
        ]
        .unwrap();

        let result = linear().fit(&df);
        assert!(matches!(result, Err(BenchError::ImputationFailed { .. })));
    }

    #[test]
    fn test_random_forest_is_reproducible() {
        let train = df![
            "a" => [1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            "b" => [1.0, 4.0, 9.0, 16.0, 25.0, 36.0],
        ]
        .unwrap();
        let query = df![
            "a" => [Some(2.5), None],
            "b" => [None, Some(20.0)],
        ]
        .unwrap();

        let run = || {
            let mut forest = RandomForestRegressor::default();
            forest.n_estimators = 10;
            let mut imputer = IterativeImputer::new(Estimator::RandomForest(forest));
            imputer.set_param("random_state", 4.0).unwrap();
            imputer.fit(&train).unwrap();
            imputer.transform(&query).unwrap()
        };

        let first = run();
        let second = run();
        assert!(first.equals(&second));
    }

    #[test]
    fn test_bayesian_ridge_imputation_close_to_line() {
        let train = df![
            "x" => [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0],
            "y" => [2.1, 3.9, 6.2, 7.8, 10.1, 11.9, 14.2, 15.8],
        ]
        .unwrap();
        let query = df![
            "x" => [Some(4.5)],
            "y" => [Option::<f64>::None],
        ]
        .unwrap();

        let mut imputer = IterativeImputer::new(Estimator::BayesianRidge(BayesianRidge::default()));
        imputer.fit(&train).unwrap();
        let result = imputer.transform(&query).unwrap();
        assert!((value_at(&result, "y", 0) - 9.0).abs() < 0.3);
    }
}
