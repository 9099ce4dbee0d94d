//! Hyperparameter sweeps over an imputer family.
//!
//! For each sweep value the runner builds a fresh imputer, fits it on the rows
//! that kept every value, imputes the whole table and records the mean squared
//! error per column over the rows where that column was the missing one.

use crate::config::{BenchConfig, ParamKind};
use crate::error::{BenchError, Result};
use crate::imputers::{Imputer, build_imputer};
use crate::scaling::Scaler;
use crate::scoring::ImputationResult;
use crate::types::{MissingColumnMap, Table};
use crate::utils::{column_names, frame_to_rows, rows_to_frame, select_rows};
use polars::prelude::*;
use std::fmt;
use tracing::{debug, info};

/// Column of the long result table naming the original column.
pub const COLUMN_LABEL: &str = "col";
/// Column of the long result table holding the mean squared error.
pub const VALUE_LABEL: &str = "val";

/// Iterative imputer parameter filled from [`BenchConfig::seed`] unless set explicitly.
const RANDOM_STATE: &str = "random_state";

/// Long-format errors plus the imputer fitted at every sweep value.
pub struct SweepOutcome {
    /// One row per (sweep value, column): `{var_name, "col", "val"}`.
    pub results: Table,
    /// Fitted imputers in sweep order.
    pub imputers: Vec<(f64, Box<dyn Imputer>)>,
}

impl fmt::Debug for SweepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SweepOutcome")
            .field("results", &self.results.shape())
            .field("imputers", &self.imputers.len())
            .finish()
    }
}

impl SweepOutcome {
    /// The imputer fitted for `value`, if it was part of the sweep.
    pub fn imputer_for(&self, value: f64) -> Option<&dyn Imputer> {
        self.imputers
            .iter()
            .find(|(v, _)| *v == value)
            .map(|(_, imputer)| imputer.as_ref())
    }
}

/// Drives one imputer family across a range of one hyperparameter.
pub struct SweepRunner;

impl SweepRunner {
    /// Run the sweep.
    ///
    /// `truth` is the complete table, `with_missing` the same table after
    /// injection and `missing` the row → column map of the injected cells.
    /// Rows absent from `missing` form the training set. Iterative families
    /// take `config.seed` as their `random_state` unless the imputer
    /// parameters already name one.
    pub fn run(
        truth: &Table,
        with_missing: &Table,
        missing: &MissingColumnMap,
        var_range: &[f64],
        config: &BenchConfig,
    ) -> Result<SweepOutcome> {
        config.validate()?;

        let columns = column_names(truth);
        if column_names(with_missing) != columns || with_missing.height() != truth.height() {
            return Err(BenchError::InvalidConfig(
                "table with missing values must match the ground-truth table's shape and columns"
                    .to_string(),
            ));
        }

        let train_rows: Vec<usize> = (0..truth.height())
            .filter(|row| !missing.contains_key(row))
            .collect();
        if train_rows.is_empty() {
            return Err(BenchError::InvalidConfig(
                "no complete rows to fit on: every row has a missing value".to_string(),
            ));
        }

        info!(
            "Sweeping {} over {} values of '{}' ({} training rows, {} imputed rows)",
            config.imputer,
            var_range.len(),
            config.param_name,
            train_rows.len(),
            missing.len()
        );

        // Distance-based families see every column on the same [0, 1] scale
        let scaler = if config.imputer.is_knn() && config.scale {
            debug!("Min-max scaling both tables before fitting");
            Some(Scaler::build_all(truth)?)
        } else {
            None
        };
        let (label_table, query_table) = match &scaler {
            Some(scaler) => (scaler.apply(truth)?, scaler.apply(with_missing)?),
            None => (truth.clone(), with_missing.clone()),
        };

        let query_rows = frame_to_rows(&query_table, &columns)?;
        let train_table = rows_to_frame(&columns, &select_rows(&query_rows, &train_rows))?;

        let mut var_values = Vec::with_capacity(var_range.len() * columns.len());
        let mut col_values = Vec::with_capacity(var_range.len() * columns.len());
        let mut err_values = Vec::with_capacity(var_range.len() * columns.len());
        let mut imputers = Vec::with_capacity(var_range.len());

        for &value in var_range {
            let mut imputer_params = config.imputer_params.clone();
            let mut estimator_params = config.estimator_params.clone();
            if !config.imputer.is_knn() {
                imputer_params
                    .entry(RANDOM_STATE.to_string())
                    .or_insert(config.seed as f64);
            }
            match config.param_kind {
                ParamKind::Imputer => imputer_params.insert(config.param_name.clone(), value),
                ParamKind::Estimator => estimator_params.insert(config.param_name.clone(), value),
            };

            let mut imputer = build_imputer(config.imputer, &imputer_params, &estimator_params)
                .map_err(|e| e.with_context(format!("{} = {}", config.param_name, value)))?;
            imputer.fit(&train_table)?;
            let imputed = imputer.transform(&query_table)?;

            let (real, imputed) = match &scaler {
                Some(scaler) => (scaler.invert(&label_table)?, scaler.invert(&imputed)?),
                None => (label_table.clone(), imputed),
            };

            let result = ImputationResult::assemble(&real, &imputed, missing)?;
            for (column, mse) in result.imputed_squared_error()? {
                debug!("{} = {}: '{}' MSE {:.6}", config.var_name, value, column, mse);
                var_values.push(value);
                col_values.push(column);
                err_values.push(mse);
            }

            info!("Finished sweep point {} = {}", config.var_name, value);
            imputers.push((value, imputer));
        }

        let results = DataFrame::new(vec![
            Column::new(config.var_name.as_str().into(), var_values),
            Column::new(COLUMN_LABEL.into(), col_values),
            Column::new(VALUE_LABEL.into(), err_values),
        ])?;

        Ok(SweepOutcome { results, imputers })
    }
}
