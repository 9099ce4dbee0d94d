//! Synthetic missingness.
//!
//! Every targeted row loses exactly one value. The column removed from a row
//! is drawn from the weight map through [`ProbabilitySampler`]. By default
//! every row is targeted; [`MissingValueInjector::inject_rows`] restricts the
//! damage to a subset so the untouched rows can serve as training data.

use crate::error::{BenchError, Result};
use crate::sampling::ProbabilitySampler;
use crate::types::{MissingColumnMap, Table, WeightMap};
use crate::utils::column_values;
use polars::prelude::*;
use rand::Rng;
use rand::seq::index;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

/// Result of removing one value per row.
#[derive(Debug, Clone)]
pub struct InjectionOutcome {
    /// Same shape and row order as the input, one null per row.
    pub table: Table,
    /// Row index → column nulled in that row.
    pub missing_columns: MissingColumnMap,
    /// Rows that lost a value; the full row index when every row was targeted.
    pub affected_rows: Vec<usize>,
    /// Picked column per row, in row order.
    pub picked_columns: Vec<String>,
}

impl InjectionOutcome {
    /// Number of rows whose value was removed from `column`.
    pub fn count_for(&self, column: &str) -> usize {
        self.picked_columns.iter().filter(|c| *c == column).count()
    }
}

/// Removes one attribute per row according to a weight map.
pub struct MissingValueInjector;

impl MissingValueInjector {
    /// Null out one cell per row of `table`.
    ///
    /// Columns named in `weights` are rewritten as `Float64`; other columns are
    /// left untouched.
    pub fn inject<R: Rng + ?Sized>(
        table: &Table,
        weights: &WeightMap,
        rng: &mut R,
    ) -> Result<InjectionOutcome> {
        let rows: Vec<usize> = (0..table.height()).collect();
        Self::inject_rows(table, &rows, weights, rng)
    }

    /// Null out one cell in each of `rows`, leaving every other row complete.
    ///
    /// `rows` must be distinct positions inside the table; the outcome's
    /// `affected_rows` and `picked_columns` follow their order.
    pub fn inject_rows<R: Rng + ?Sized>(
        table: &Table,
        rows: &[usize],
        weights: &WeightMap,
        rng: &mut R,
    ) -> Result<InjectionOutcome> {
        let partition = ProbabilitySampler::build_partition(weights)?;

        for (column, _) in weights.iter() {
            if table.column(column).is_err() {
                return Err(BenchError::ColumnNotFound(column.to_string()));
            }
        }
        let height = table.height();
        let distinct: BTreeSet<usize> = rows.iter().copied().collect();
        if distinct.len() != rows.len() || rows.iter().any(|&r| r >= height) {
            return Err(BenchError::InvalidConfig(format!(
                "injection rows must be distinct positions below {}",
                height
            )));
        }

        let picked_columns = ProbabilitySampler::sample(rows.len(), &partition, rng)?;

        let mut rows_by_column: HashMap<&str, Vec<usize>> = HashMap::new();
        for (&row, column) in rows.iter().zip(&picked_columns) {
            rows_by_column.entry(column.as_str()).or_default().push(row);
        }

        let mut result = table.clone();
        for (column, _) in weights.iter() {
            let mut values = column_values(table, column)?;
            let removed = rows_by_column.get(column).map(Vec::as_slice).unwrap_or(&[]);
            for &row in removed {
                values[row] = None;
            }
            debug!("Removed {} values from '{}'", removed.len(), column);
            result.with_column(Column::new(column.into(), values))?;
        }

        let missing_columns: MissingColumnMap = rows
            .iter()
            .zip(&picked_columns)
            .map(|(&row, column)| (row, column.clone()))
            .collect();

        info!(
            "Injected {} missing values across {} columns",
            rows.len(),
            rows_by_column.len()
        );

        Ok(InjectionOutcome {
            table: result,
            missing_columns,
            affected_rows: rows.to_vec(),
            picked_columns,
        })
    }

    /// Choose `count` distinct row positions out of `n_rows`, ascending.
    pub fn choose_rows<R: Rng + ?Sized>(n_rows: usize, count: usize, rng: &mut R) -> Result<Vec<usize>> {
        if count > n_rows {
            return Err(BenchError::InvalidConfig(format!(
                "cannot choose {} rows out of {}",
                count, n_rows
            )));
        }
        let mut rows = index::sample(rng, n_rows, count).into_vec();
        rows.sort_unstable();
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{column_names, frame_to_rows};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn sample_table() -> DataFrame {
        df![
            "a" => [1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            "b" => [10.0, 20.0, 30.0, 40.0, 50.0, 60.0],
            "c" => [7i64, 8, 9, 10, 11, 12],
        ]
        .unwrap()
    }

    #[test]
    fn test_exactly_one_missing_cell_per_row() {
        let df = sample_table();
        let weights = WeightMap::uniform(&["a", "b", "c"]);
        let mut rng = StdRng::seed_from_u64(3);

        let outcome = MissingValueInjector::inject(&df, &weights, &mut rng).unwrap();
        let columns = column_names(&outcome.table);
        let rows = frame_to_rows(&outcome.table, &columns).unwrap();

        for (row_idx, row) in rows.iter().enumerate() {
            let missing: Vec<usize> = (0..row.len()).filter(|&j| row[j].is_none()).collect();
            assert_eq!(missing.len(), 1, "row {} should miss exactly one cell", row_idx);
            assert_eq!(columns[missing[0]], outcome.missing_columns[&row_idx]);
        }
    }

    #[test]
    fn test_affected_rows_is_full_index() {
        let df = sample_table();
        let weights = WeightMap::new().with("a", 1).with("b", 2);
        let mut rng = StdRng::seed_from_u64(11);

        let outcome = MissingValueInjector::inject(&df, &weights, &mut rng).unwrap();
        assert_eq!(outcome.affected_rows, (0..df.height()).collect::<Vec<_>>());
        assert_eq!(outcome.missing_columns.len(), df.height());
        assert_eq!(outcome.table.shape(), df.shape());
    }

    #[test]
    fn test_unweighted_columns_untouched() {
        let df = sample_table();
        let weights = WeightMap::new().with("a", 1);
        let mut rng = StdRng::seed_from_u64(5);

        let outcome = MissingValueInjector::inject(&df, &weights, &mut rng).unwrap();
        assert_eq!(outcome.table.column("a").unwrap().null_count(), df.height());
        assert_eq!(outcome.table.column("b").unwrap().null_count(), 0);
        assert_eq!(outcome.count_for("a"), df.height());
    }

    #[test]
    fn test_unknown_weighted_column_fails() {
        let df = sample_table();
        let weights = WeightMap::new().with("zzz", 1);
        let mut rng = StdRng::seed_from_u64(5);

        let result = MissingValueInjector::inject(&df, &weights, &mut rng);
        assert!(matches!(result, Err(BenchError::ColumnNotFound(_))));
    }

    #[test]
    fn test_empty_table() {
        let df = df!["a" => Vec::<f64>::new()].unwrap();
        let weights = WeightMap::new().with("a", 1);
        let mut rng = StdRng::seed_from_u64(5);

        let outcome = MissingValueInjector::inject(&df, &weights, &mut rng).unwrap();
        assert!(outcome.missing_columns.is_empty());
        assert!(outcome.affected_rows.is_empty());
    }

    // ========================================================================
    // inject_rows() / choose_rows() tests
    // ========================================================================

    #[test]
    fn test_inject_rows_leaves_other_rows_complete() {
        let df = sample_table();
        let weights = WeightMap::uniform(&["a", "b"]);
        let mut rng = StdRng::seed_from_u64(21);

        let outcome = MissingValueInjector::inject_rows(&df, &[1, 4], &weights, &mut rng).unwrap();
        let columns = column_names(&outcome.table);
        let rows = frame_to_rows(&outcome.table, &columns).unwrap();

        assert_eq!(outcome.affected_rows, vec![1, 4]);
        assert_eq!(outcome.missing_columns.keys().copied().collect::<Vec<_>>(), vec![1, 4]);
        for (row_idx, row) in rows.iter().enumerate() {
            let missing = row.iter().filter(|c| c.is_none()).count();
            let expected = usize::from(row_idx == 1 || row_idx == 4);
            assert_eq!(missing, expected, "row {}", row_idx);
        }
    }

    #[test]
    fn test_inject_rows_rejects_bad_positions() {
        let df = sample_table();
        let weights = WeightMap::new().with("a", 1);
        let mut rng = StdRng::seed_from_u64(1);

        assert!(MissingValueInjector::inject_rows(&df, &[0, 0], &weights, &mut rng).is_err());
        assert!(MissingValueInjector::inject_rows(&df, &[6], &weights, &mut rng).is_err());
    }

    #[test]
    fn test_choose_rows_sorted_and_distinct() {
        let mut rng = StdRng::seed_from_u64(8);
        let rows = MissingValueInjector::choose_rows(10, 4, &mut rng).unwrap();
        assert_eq!(rows.len(), 4);
        assert!(rows.windows(2).all(|w| w[0] < w[1]));
        assert!(rows.iter().all(|&r| r < 10));

        assert!(MissingValueInjector::choose_rows(3, 4, &mut rng).is_err());
    }
}
