//! k-nearest-neighbor imputation over mixed attribute types.
//!
//! Each query row has exactly one missing attribute, named by the
//! [`MissingColumnMap`]. Its value is predicted from the `k` training rows
//! closest to the query over all other attributes:
//!
//! - categorical targets take the (weighted) majority vote of the neighbors;
//!   a tied vote widens the neighborhood one row at a time and, once every
//!   candidate is included, falls back to a uniform random pick among the tied
//!   values
//! - qualitative targets take the (weighted) mean of the neighbors
//!
//! Weighted mode scores each neighbor with `1 / distance²`. A neighbor at
//! distance zero scores infinity, so an exact match always wins a vote.

use super::nan_euclidean;
use crate::config::{AttributeType, BenchConfig};
use crate::error::{BenchError, Result};
use crate::types::{AttributeTypeMap, MissingColumnMap, Table};
use crate::utils::{column_names, column_position, frame_to_rows};
use polars::prelude::*;
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{debug, info, trace};

/// Name of the column holding one prediction per query row.
pub const PREDICTIONS_COLUMN: &str = "predictions";

/// A training row ranked by its distance to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Neighbor {
    row: usize,
    distance: f64,
    value: f64,
}

/// Resolution state of a single query row.
#[derive(Debug)]
enum KnnState {
    /// Take the `k` closest candidates.
    Search(usize),
    /// Aggregate the `k` closest candidates.
    Vote(usize),
    /// The vote over `k` neighbors tied between the given values.
    Escalate { k: usize, tied: Vec<f64> },
    /// Every candidate was included and the vote is still tied.
    RandomPick(Vec<f64>),
    Done(f64),
}

/// Outcome of a categorical vote.
#[derive(Debug, PartialEq)]
enum Tally {
    Unique(f64),
    Tied(Vec<f64>),
}

/// k-NN imputer supporting categorical and qualitative targets.
#[derive(Debug, Clone)]
pub struct CustomKnnImputer {
    k: usize,
    weighted: bool,
}

impl CustomKnnImputer {
    /// Create a new imputer; `k` must be at least 1.
    pub fn new(k: usize, weighted: bool) -> Result<Self> {
        if k == 0 {
            return Err(BenchError::InvalidConfig(
                "k must be at least 1".to_string(),
            ));
        }
        Ok(Self { k, weighted })
    }

    /// Build from the `k` and `weighted` settings of a run configuration.
    pub fn from_config(config: &BenchConfig) -> Result<Self> {
        Self::new(config.k, config.weighted)
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn is_weighted(&self) -> bool {
        self.weighted
    }

    /// Predict the missing attribute of every row of `test`.
    ///
    /// Keys of `missing` are row positions in `test`. Returns `test` with an
    /// extra [`PREDICTIONS_COLUMN`]. Fails up front when `k` exceeds the number
    /// of training rows or when a referenced column has no declared type.
    pub fn impute<R: Rng + ?Sized>(
        &self,
        train: &Table,
        test: &Table,
        missing: &MissingColumnMap,
        types: &AttributeTypeMap,
        rng: &mut R,
    ) -> Result<Table> {
        let predictions = self.predict(train, test, missing, types, rng)?;

        let mut result = test.clone();
        result.with_column(Column::new(PREDICTIONS_COLUMN.into(), predictions))?;
        Ok(result)
    }

    /// Like [`impute`](Self::impute) but returns the bare predictions in row order.
    pub fn predict<R: Rng + ?Sized>(
        &self,
        train: &Table,
        test: &Table,
        missing: &MissingColumnMap,
        types: &AttributeTypeMap,
        rng: &mut R,
    ) -> Result<Vec<f64>> {
        if self.k > train.height() {
            return Err(BenchError::TooManyNeighbors {
                k: self.k,
                available: train.height(),
            });
        }

        let columns = column_names(train);
        for column in &columns {
            if test.column(column).is_err() {
                return Err(BenchError::ColumnNotFound(column.clone()));
            }
        }

        let mut targets = Vec::with_capacity(test.height());
        for row in 0..test.height() {
            let column = missing.get(&row).ok_or_else(|| BenchError::ImputationFailed {
                column: String::new(),
                reason: format!("row {} has no entry in the missing-column map", row),
            })?;
            let attr_type = *types
                .get(column)
                .ok_or_else(|| BenchError::MissingAttributeType(column.clone()))?;
            targets.push((column_position(&columns, column)?, attr_type));
        }

        let train_rows = frame_to_rows(train, &columns)?;
        let test_rows = frame_to_rows(test, &columns)?;

        info!(
            "Imputing {} rows from {} training rows (k = {}, weighted = {})",
            test_rows.len(),
            train_rows.len(),
            self.k,
            self.weighted
        );

        test_rows
            .iter()
            .zip(targets)
            .map(|(query, (target, attr_type))| {
                self.resolve(&train_rows, query, target, attr_type, rng)
                    .map_err(|e| e.with_context(format!("imputing '{}'", columns[target])))
            })
            .collect()
    }

    /// Resolve the missing `target` attribute of one query row.
    fn resolve<R: Rng + ?Sized>(
        &self,
        train_rows: &[Vec<Option<f64>>],
        query: &[Option<f64>],
        target: usize,
        attr_type: AttributeType,
        rng: &mut R,
    ) -> Result<f64> {
        // The ranking does not depend on k, so it is computed once and sliced.
        let ranked = rank_candidates(train_rows, query, target);
        if ranked.len() < self.k {
            return Err(BenchError::TooManyNeighbors {
                k: self.k,
                available: ranked.len(),
            });
        }

        let mut state = KnnState::Search(self.k);
        loop {
            state = match state {
                KnnState::Search(k) => {
                    trace!(k, "searching neighbors");
                    KnnState::Vote(k)
                }
                KnnState::Vote(k) => {
                    let neighbors = &ranked[..k];
                    trace!(k, nearest = neighbors[0].row, "voting");
                    match attr_type {
                        AttributeType::Qualitative => {
                            KnnState::Done(average(neighbors, self.weighted))
                        }
                        AttributeType::Categorical => match tally(neighbors, self.weighted) {
                            Tally::Unique(value) => KnnState::Done(value),
                            Tally::Tied(tied) => KnnState::Escalate { k, tied },
                        },
                    }
                }
                KnnState::Escalate { k, tied } => {
                    if k < ranked.len() {
                        debug!(k, ties = tied.len(), "vote tied, widening neighborhood");
                        KnnState::Search(k + 1)
                    } else {
                        KnnState::RandomPick(tied)
                    }
                }
                KnnState::RandomPick(tied) => {
                    let value = tied.choose(rng).copied().ok_or_else(|| {
                        BenchError::InvariantViolation("tie with no tied values".to_string())
                    })?;
                    debug!(value, candidates = tied.len(), "tie unresolved, picked at random");
                    KnnState::Done(value)
                }
                KnnState::Done(value) => return Ok(value),
            };
        }
    }
}

/// Candidates with a present target, ordered by (distance, row position).
fn rank_candidates(
    train_rows: &[Vec<Option<f64>>],
    query: &[Option<f64>],
    target: usize,
) -> Vec<Neighbor> {
    let mut ranked: Vec<Neighbor> = train_rows
        .iter()
        .enumerate()
        .filter_map(|(row, candidate)| {
            candidate[target].map(|value| Neighbor {
                row,
                distance: nan_euclidean(query, candidate, Some(target)),
                value,
            })
        })
        .collect();

    // Stable sort: equal distances keep row order.
    ranked.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    ranked
}

fn inverse_square(distance: f64) -> f64 {
    if distance > 0.0 {
        1.0 / (distance * distance)
    } else {
        f64::INFINITY
    }
}

/// Majority vote, counting neighbors or summing `1 / distance²`.
fn tally(neighbors: &[Neighbor], weighted: bool) -> Tally {
    // Insertion-ordered so tied values keep encounter order.
    let mut scores: Vec<(f64, f64)> = Vec::new();
    for neighbor in neighbors {
        let contribution = if weighted {
            inverse_square(neighbor.distance)
        } else {
            1.0
        };
        match scores
            .iter_mut()
            .find(|(value, _)| *value == neighbor.value)
        {
            Some(entry) => entry.1 += contribution,
            None => scores.push((neighbor.value, contribution)),
        }
    }

    let max = scores
        .iter()
        .map(|(_, score)| *score)
        .fold(f64::NEG_INFINITY, f64::max);
    let mut tied: Vec<f64> = scores
        .iter()
        .filter(|(_, score)| *score == max)
        .map(|(value, _)| *value)
        .collect();

    if tied.len() == 1 {
        Tally::Unique(tied.remove(0))
    } else {
        Tally::Tied(tied)
    }
}

fn mean<'a>(neighbors: impl IntoIterator<Item = &'a Neighbor>) -> f64 {
    let (sum, count) = neighbors
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), n| (sum + n.value, count + 1));
    sum / count as f64
}

/// Mean of the neighbor values, optionally weighted by `1 / distance²`.
fn average(neighbors: &[Neighbor], weighted: bool) -> f64 {
    if !weighted {
        return mean(neighbors);
    }

    // Exact matches dominate: the limit of 1/d² weighting as d → 0. A distance
    // small enough for d² to underflow counts as exact.
    let exact: Vec<&Neighbor> = neighbors
        .iter()
        .filter(|n| inverse_square(n.distance).is_infinite())
        .collect();
    if !exact.is_empty() {
        return mean(exact);
    }

    let (weighted_sum, weight_sum) = neighbors.iter().fold((0.0, 0.0), |(ws, w), n| {
        let weight = inverse_square(n.distance);
        (ws + weight * n.value, w + weight)
    });

    if weight_sum > 0.0 {
        weighted_sum / weight_sum
    } else {
        mean(neighbors)
    }
}
