//! Weighted column sampling.
//!
//! A [`WeightMap`] is normalized into probabilities which are laid end to end
//! over the unit interval. Each uniform draw in `[0, 1)` is then classified by
//! the sub-interval that contains it.

use crate::error::{BenchError, Result};
use crate::types::WeightMap;
use rand::Rng;
use serde::Serialize;
use tracing::trace;

/// A sub-interval of `[0, 1]`, closed on the left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Interval {
    pub left: f64,
    pub right: f64,
    /// Only the last interval of a partition includes its right end.
    pub closed_right: bool,
}

impl Interval {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.left
            && (value < self.right || (self.closed_right && value <= self.right))
    }

    pub fn length(&self) -> f64 {
        self.right - self.left
    }
}

/// Contiguous intervals jointly covering `[0, 1]`, each paired with a column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbabilityPartition {
    slots: Vec<(Interval, String)>,
}

static_assertions::assert_impl_all!(ProbabilityPartition: Send, Sync);

impl ProbabilityPartition {
    pub fn intervals(&self) -> impl Iterator<Item = (&Interval, &str)> {
        self.slots.iter().map(|(interval, col)| (interval, col.as_str()))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Column whose interval contains `draw`, by linear scan.
    pub fn locate(&self, draw: f64) -> Option<&str> {
        self.slots
            .iter()
            .find(|(interval, _)| interval.contains(draw))
            .map(|(_, col)| col.as_str())
    }
}

/// Builds probability partitions and draws columns from them.
pub struct ProbabilitySampler;

impl ProbabilitySampler {
    /// Normalize `weights` and lay the probabilities out over `[0, 1]`.
    ///
    /// The last interval is closed on both ends and always ends at exactly 1.0,
    /// absorbing any floating-point drift in the running sum.
    pub fn build_partition(weights: &WeightMap) -> Result<ProbabilityPartition> {
        weights.validate()?;

        let total = weights.total() as f64;
        let last = weights.len() - 1;
        let mut slots = Vec::with_capacity(weights.len());
        let mut cum_sum = 0.0;

        for (i, (column, weight)) in weights.iter().enumerate() {
            let is_last = i == last;
            let next = if is_last {
                1.0
            } else {
                cum_sum + f64::from(weight) / total
            };

            slots.push((
                Interval {
                    left: cum_sum,
                    right: next,
                    closed_right: is_last,
                },
                column.to_string(),
            ));
            cum_sum = next;
        }

        Ok(ProbabilityPartition { slots })
    }

    /// Draw `n` columns independently from `partition`.
    pub fn sample<R: Rng + ?Sized>(
        n: usize,
        partition: &ProbabilityPartition,
        rng: &mut R,
    ) -> Result<Vec<String>> {
        (0..n)
            .map(|_| {
                let draw: f64 = rng.r#gen();
                Self::classify(draw, partition)
            })
            .collect()
    }

    /// Map a single draw to its column.
    pub fn classify(draw: f64, partition: &ProbabilityPartition) -> Result<String> {
        match partition.locate(draw) {
            Some(col) => {
                trace!(draw, column = col, "classified draw");
                Ok(col.to_string())
            }
            None => Err(BenchError::InvariantViolation(format!(
                "draw {} is outside every interval of the partition",
                draw
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    // ========================================================================
    // build_partition() tests
    // ========================================================================

    #[test]
    fn test_partition_is_contiguous_and_covers_unit_interval() {
        let weights = WeightMap::new().with("a", 2).with("b", 5).with("c", 1).with("d", 7);
        let partition = ProbabilitySampler::build_partition(&weights).unwrap();

        let intervals: Vec<&Interval> = partition.intervals().map(|(i, _)| i).collect();
        assert_eq!(intervals.first().unwrap().left, 0.0);
        assert_eq!(intervals.last().unwrap().right, 1.0);
        for pair in intervals.windows(2) {
            assert_eq!(pair[0].right, pair[1].left);
            assert!(!pair[0].closed_right);
        }
        assert!(intervals.last().unwrap().closed_right);

        let total: f64 = intervals.iter().map(|i| i.length()).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_partition_lengths_proportional_to_weights() {
        let weights = WeightMap::new().with("a", 1).with("b", 3);
        let partition = ProbabilitySampler::build_partition(&weights).unwrap();
        let lengths: Vec<f64> = partition.intervals().map(|(i, _)| i.length()).collect();
        assert!((lengths[0] - 0.25).abs() < 1e-12);
        assert!((lengths[1] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_draw_of_one_resolves_to_last_column() {
        let weights = WeightMap::new().with("x", 1).with("y", 1).with("z", 1);
        let partition = ProbabilitySampler::build_partition(&weights).unwrap();
        assert_eq!(ProbabilitySampler::classify(1.0, &partition).unwrap(), "z");
        assert_eq!(ProbabilitySampler::classify(0.0, &partition).unwrap(), "x");
    }

    #[test]
    fn test_boundary_belongs_to_right_interval() {
        let weights = WeightMap::new().with("a", 1).with("b", 1);
        let partition = ProbabilitySampler::build_partition(&weights).unwrap();
        assert_eq!(partition.locate(0.5), Some("b"));
    }

    #[test]
    fn test_single_column_partition() {
        let weights = WeightMap::new().with("only", 9);
        let partition = ProbabilitySampler::build_partition(&weights).unwrap();
        assert_eq!(partition.len(), 1);
        assert_eq!(partition.locate(0.0), Some("only"));
        assert_eq!(partition.locate(1.0), Some("only"));
    }

    #[test]
    fn test_invalid_weight_maps_rejected() {
        assert!(matches!(
            ProbabilitySampler::build_partition(&WeightMap::new()),
            Err(BenchError::EmptyWeightMap)
        ));
        assert!(matches!(
            ProbabilitySampler::build_partition(&WeightMap::new().with("a", 0)),
            Err(BenchError::InvalidWeight { .. })
        ));
    }

    #[test]
    fn test_draw_outside_partition_is_invariant_violation() {
        let partition = ProbabilitySampler::build_partition(&WeightMap::new().with("a", 1)).unwrap();
        let err = ProbabilitySampler::classify(1.5, &partition).unwrap_err();
        assert_eq!(err.error_code(), "INVARIANT_VIOLATION");
    }

    // ========================================================================
    // sample() tests
    // ========================================================================

    #[test]
    fn test_sample_frequencies_follow_weights() {
        let weights = WeightMap::new().with("A", 1).with("B", 3);
        let partition = ProbabilitySampler::build_partition(&weights).unwrap();
        let mut rng = StdRng::seed_from_u64(1234);

        let picked = ProbabilitySampler::sample(10_000, &partition, &mut rng).unwrap();
        assert_eq!(picked.len(), 10_000);

        let b_share = picked.iter().filter(|c| *c == "B").count() as f64 / 10_000.0;
        assert!((b_share - 0.75).abs() < 0.02, "B share was {}", b_share);
    }

    #[test]
    fn test_sample_is_reproducible_for_same_seed() {
        let weights = WeightMap::uniform(&["a", "b", "c"]);
        let partition = ProbabilitySampler::build_partition(&weights).unwrap();

        let first =
            ProbabilitySampler::sample(50, &partition, &mut StdRng::seed_from_u64(9)).unwrap();
        let second =
            ProbabilitySampler::sample(50, &partition, &mut StdRng::seed_from_u64(9)).unwrap();
        assert_eq!(first, second);
    }
}
