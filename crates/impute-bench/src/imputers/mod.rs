//! Imputation module for handling missing values.
//!
//! This module provides:
//! - [`CustomKnnImputer`], the mixed-type k-NN imputer with tie escalation
//! - [`KnnImputer`], a fit/transform k-NN imputer (uniform or distance weights)
//! - [`IterativeImputer`], chained-equations imputation over a regression
//!   [`Estimator`]
//!
//! The fit/transform imputers share the [`Imputer`] trait and are built from an
//! [`ImputerFamily`] and a parameter set by [`build_imputer`].

mod custom_knn;
mod estimators;
mod iterative;
mod knn;

pub use custom_knn::{CustomKnnImputer, PREDICTIONS_COLUMN};
pub use estimators::{BayesianRidge, Estimator, LinearRegression, RandomForestRegressor};
pub use iterative::IterativeImputer;
pub use knn::{KnnImputer, KnnWeights};

use crate::config::ImputerFamily;
use crate::error::{BenchError, Result};
use crate::types::Table;
use std::collections::BTreeMap;
use std::fmt;

/// An estimator that learns from one table and fills the missing cells of another.
pub trait Imputer: Send + Sync + fmt::Debug {
    /// Short name for logs and reports.
    fn name(&self) -> &'static str;

    /// Learn from `table`.
    fn fit(&mut self, table: &Table) -> Result<()>;

    /// Return `table` with every missing cell filled, as `Float64` columns.
    fn transform(&self, table: &Table) -> Result<Table>;

    /// Fit and transform in one step.
    fn fit_transform(&mut self, table: &Table) -> Result<Table> {
        self.fit(table)?;
        self.transform(table)
    }
}

/// Build an unfitted imputer of `family` from imputer- and estimator-level parameters.
///
/// Unknown parameter names are rejected here, before any fitting happens.
pub fn build_imputer(
    family: ImputerFamily,
    imputer_params: &BTreeMap<String, f64>,
    estimator_params: &BTreeMap<String, f64>,
) -> Result<Box<dyn Imputer>> {
    match family {
        ImputerFamily::UniformKnn | ImputerFamily::DistanceKnn => {
            let weights = if family == ImputerFamily::DistanceKnn {
                KnnWeights::Distance
            } else {
                KnnWeights::Uniform
            };
            if let Some(name) = estimator_params.keys().next() {
                return Err(BenchError::UnknownParameter {
                    name: name.clone(),
                    target: format!("{} (no estimator)", family),
                });
            }
            let mut imputer = KnnImputer::new(5, weights);
            for (name, value) in imputer_params {
                imputer.set_param(name, *value)?;
            }
            Ok(Box::new(imputer))
        }
        ImputerFamily::IterativeLinear
        | ImputerFamily::IterativeBayesianRidge
        | ImputerFamily::IterativeRandomForest => {
            let mut estimator = match family {
                ImputerFamily::IterativeLinear => Estimator::Linear(LinearRegression::default()),
                ImputerFamily::IterativeBayesianRidge => {
                    Estimator::BayesianRidge(BayesianRidge::default())
                }
                _ => Estimator::RandomForest(RandomForestRegressor::default()),
            };
            for (name, value) in estimator_params {
                estimator.set_param(name, *value)?;
            }
            let mut imputer = IterativeImputer::new(estimator);
            for (name, value) in imputer_params {
                imputer.set_param(name, *value)?;
            }
            Ok(Box::new(imputer))
        }
    }
}

/// Euclidean distance ignoring missing pairs and the optional `skip` column.
///
/// The sum over present pairs is rescaled by `compared / present`, so complete
/// rows get the plain Euclidean distance. With no comparable pair the distance
/// is infinite.
pub(crate) fn nan_euclidean(a: &[Option<f64>], b: &[Option<f64>], skip: Option<usize>) -> f64 {
    let mut sum_squared_diff = 0.0;
    let mut compared = 0usize;
    let mut present = 0usize;

    for (col_idx, (x, y)) in a.iter().zip(b).enumerate() {
        if Some(col_idx) == skip {
            continue;
        }
        compared += 1;
        if let (Some(x), Some(y)) = (x, y) {
            let diff = x - y;
            sum_squared_diff += diff * diff;
            present += 1;
        }
    }

    match (compared, present) {
        (0, _) => 0.0,
        (_, 0) => f64::INFINITY,
        _ => (sum_squared_diff * compared as f64 / present as f64).sqrt(),
    }
}

/// Interpret a parameter value as a positive integer count.
pub(crate) fn param_count(name: &str, value: f64) -> Result<usize> {
    if value < 1.0 || value.fract() != 0.0 || !value.is_finite() {
        return Err(BenchError::InvalidConfig(format!(
            "parameter '{}' must be a positive integer, got {}",
            name, value
        )));
    }
    Ok(value as usize)
}

/// Interpret a parameter value as a non-negative integer (seeds, optional depths).
pub(crate) fn param_index(name: &str, value: f64) -> Result<u64> {
    if value < 0.0 || value.fract() != 0.0 || !value.is_finite() {
        return Err(BenchError::InvalidConfig(format!(
            "parameter '{}' must be a non-negative integer, got {}",
            name, value
        )));
    }
    Ok(value as u64)
}

/// Interpret a parameter value as a strictly positive real.
pub(crate) fn param_positive(name: &str, value: f64) -> Result<f64> {
    if value <= 0.0 || !value.is_finite() {
        return Err(BenchError::InvalidConfig(format!(
            "parameter '{}' must be positive, got {}",
            name, value
        )));
    }
    Ok(value)
}

/// Interpret a parameter value as a 0/1 flag.
pub(crate) fn param_flag(name: &str, value: f64) -> Result<bool> {
    match value {
        v if v == 0.0 => Ok(false),
        v if v == 1.0 => Ok(true),
        _ => Err(BenchError::InvalidConfig(format!(
            "parameter '{}' must be 0 or 1, got {}",
            name, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nan_euclidean_complete_rows() {
        let a = vec![Some(0.0), Some(0.0)];
        let b = vec![Some(3.0), Some(4.0)];
        assert_eq!(nan_euclidean(&a, &b, None), 5.0);
    }

    #[test]
    fn test_nan_euclidean_with_skip_and_missing() {
        let a = vec![Some(50.0), None, Some(1.0)];
        let b = vec![Some(0.0), Some(2.0), Some(3.0)];
        // skip col 0; col 1 missing: sqrt(4 * 2 / 1)
        assert!((nan_euclidean(&a, &b, Some(0)) - 8.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_param_helpers() {
        assert_eq!(param_count("n", 3.0).unwrap(), 3);
        assert!(param_count("n", 0.0).is_err());
        assert!(param_count("n", 2.5).is_err());
        assert_eq!(param_index("seed", 0.0).unwrap(), 0);
        assert!(param_positive("tol", 0.0).is_err());
        assert!(param_flag("fit_intercept", 1.0).unwrap());
        assert!(param_flag("fit_intercept", 2.0).is_err());
    }

    #[test]
    fn test_build_imputer_names() {
        let empty = BTreeMap::new();
        for family in ImputerFamily::ALL {
            let imputer = build_imputer(family, &empty, &empty).unwrap();
            assert!(!imputer.name().is_empty());
        }
    }

    #[test]
    fn test_build_imputer_rejects_unknown_parameter() {
        let empty = BTreeMap::new();
        let params = BTreeMap::from([("n_trees".to_string(), 3.0)]);

        let err = build_imputer(ImputerFamily::IterativeRandomForest, &empty, &params).unwrap_err();
        assert!(matches!(err, BenchError::UnknownParameter { .. }));

        let err = build_imputer(ImputerFamily::UniformKnn, &empty, &params).unwrap_err();
        assert!(matches!(err, BenchError::UnknownParameter { .. }));
    }
}
