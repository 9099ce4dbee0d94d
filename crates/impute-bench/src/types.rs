use crate::config::AttributeType;
use crate::error::{BenchError, Result};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A table of rows sharing one column set; row index is the row position.
pub type Table = DataFrame;

/// Row index → the single column that was nulled in that row.
pub type MissingColumnMap = BTreeMap<usize, String>;

/// Column name → how its missing values are aggregated from neighbors.
pub type AttributeTypeMap = HashMap<String, AttributeType>;

/// Relative likelihood of each column being the one removed from a row.
///
/// Insertion order is kept; it decides the order of the probability partition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightMap {
    entries: Vec<(String, u32)>,
}

impl WeightMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column, replacing its weight if it is already present.
    pub fn with(mut self, column: impl Into<String>, weight: u32) -> Self {
        self.insert(column, weight);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, weight: u32) {
        let column = column.into();
        match self.entries.iter_mut().find(|(name, _)| *name == column) {
            Some(entry) => entry.1 = weight,
            None => self.entries.push((column, weight)),
        }
    }

    /// Uniform weights over the given columns.
    pub fn uniform<S: AsRef<str>>(columns: &[S]) -> Self {
        columns
            .iter()
            .map(|c| (c.as_ref().to_string(), 1))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.entries.iter().map(|(name, w)| (name.as_str(), *w))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all weights.
    pub fn total(&self) -> u64 {
        self.entries.iter().map(|(_, w)| u64::from(*w)).sum()
    }

    /// Reject empty maps and zero weights.
    pub fn validate(&self) -> Result<()> {
        if self.entries.is_empty() {
            return Err(BenchError::EmptyWeightMap);
        }
        if let Some((column, weight)) = self.entries.iter().find(|(_, w)| *w == 0) {
            return Err(BenchError::InvalidWeight {
                column: column.clone(),
                weight: *weight,
            });
        }
        Ok(())
    }
}

impl<S: Into<String>> FromIterator<(S, u32)> for WeightMap {
    fn from_iter<I: IntoIterator<Item = (S, u32)>>(iter: I) -> Self {
        let mut map = WeightMap::new();
        for (column, weight) in iter {
            map.insert(column, weight);
        }
        map
    }
}

/// Error metrics for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnScore {
    pub column: String,
    /// Number of cells the metrics were computed over.
    pub count: usize,
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
}
