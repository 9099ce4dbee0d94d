//! Gaussian perturbation of ground-truth tables.
//!
//! Noise is drawn from the caller's random generator, so a seeded run
//! perturbs identically every time. Missing cells stay missing.

use crate::error::{BenchError, Result};
use crate::types::Table;
use crate::utils::{column_names, column_values};
use polars::prelude::*;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use tracing::debug;

/// Adds normally distributed noise to numeric columns.
pub struct NoiseGenerator;

impl NoiseGenerator {
    /// Add independent `N(mu, sigma)` noise to every cell of `table`.
    ///
    /// Every column must be numeric; the result holds `Float64` columns.
    pub fn add_noise<R: Rng + ?Sized>(
        table: &Table,
        mu: f64,
        sigma: f64,
        rng: &mut R,
    ) -> Result<Table> {
        let normal = normal(mu, sigma)?;
        let mut result = table.clone();
        for column in column_names(table) {
            perturb(&mut result, &column, &normal, rng)?;
        }
        debug!("Added N({}, {}) noise to {} columns", mu, sigma, table.width());
        Ok(result)
    }

    /// Add `N(mean, std)` noise to `column`, where mean and sample standard
    /// deviation are the column's own. Other columns are left untouched.
    pub fn add_noise_to_column<R: Rng + ?Sized>(
        table: &Table,
        column: &str,
        rng: &mut R,
    ) -> Result<Table> {
        let floats = table
            .column(column)
            .map_err(|_| BenchError::ColumnNotFound(column.to_string()))?
            .as_materialized_series()
            .cast(&DataType::Float64)?;
        let ca = floats.f64()?;

        let (Some(mean), Some(std)) = (ca.mean(), ca.std(1)) else {
            return Err(BenchError::DegenerateComputation(format!(
                "column '{}' needs at least two values to estimate its spread",
                column
            )));
        };

        let normal = normal(mean, std)?;
        let mut result = table.clone();
        perturb(&mut result, column, &normal, rng)?;
        debug!("Added N({:.4}, {:.4}) noise to '{}'", mean, std, column);
        Ok(result)
    }
}

fn normal(mu: f64, sigma: f64) -> Result<Normal<f64>> {
    if !mu.is_finite() {
        return Err(BenchError::InvalidConfig(format!(
            "noise mean must be finite, got {}",
            mu
        )));
    }
    Normal::new(mu, sigma).map_err(|e| {
        BenchError::InvalidConfig(format!("invalid noise deviation {}: {}", sigma, e))
    })
}

fn perturb<R: Rng + ?Sized>(
    table: &mut Table,
    column: &str,
    normal: &Normal<f64>,
    rng: &mut R,
) -> Result<()> {
    let noisy: Vec<Option<f64>> = column_values(table, column)?
        .into_iter()
        .map(|v| v.map(|x| x + normal.sample(rng)))
        .collect();
    table.with_column(Column::new(column.into(), noisy))?;
    Ok(())
}
