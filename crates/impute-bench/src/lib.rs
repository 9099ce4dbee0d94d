//! Missing-Data Imputation Benchmark Library
//!
//! Tools for measuring how well imputation strategies reconstruct values that
//! were removed on purpose from a fully observed table.
//!
//! # Overview
//!
//! - **Injection**: remove exactly one value per row, choosing the column from
//!   a weighted distribution ([`MissingValueInjector`], [`ProbabilitySampler`])
//! - **Custom k-NN**: mixed categorical/continuous nearest-neighbor imputation
//!   with tie escalation ([`CustomKnnImputer`])
//! - **Fit/transform imputers**: uniform and distance-weighted k-NN and
//!   iterative regression imputers behind the [`Imputer`] trait
//! - **Noise**: seeded Gaussian perturbation of whole tables or single
//!   columns ([`NoiseGenerator`])
//! - **Scaling**: min-max normalization around distance-based imputers ([`Scaler`])
//! - **Scoring**: MSE, RMSE and MAE restricted to the imputed cells
//!   ([`ComparisonScorer`])
//! - **Sweeps**: one hyperparameter across a range of values ([`SweepRunner`])
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use impute_bench::{
//!     AttributeType, ComparisonScorer, CustomKnnImputer, MissingValueInjector, WeightMap,
//! };
//! use rand::{SeedableRng, rngs::StdRng};
//!
//! let mut rng = StdRng::seed_from_u64(42);
//! let weights = WeightMap::uniform(&["age", "income"]);
//! let outcome = MissingValueInjector::inject(&test_df, &weights, &mut rng)?;
//!
//! let types = [("age", AttributeType::Qualitative), ("income", AttributeType::Qualitative)]
//!     .into_iter()
//!     .map(|(c, t)| (c.to_string(), t))
//!     .collect();
//!
//! let imputer = CustomKnnImputer::new(5, true)?;
//! let predicted = imputer.impute(&train_df, &outcome.table, &outcome.missing_columns, &types, &mut rng)?;
//! ```
//!
//! # Sweeps
//!
//! ```rust,ignore
//! use impute_bench::{BenchConfig, ImputerFamily, SweepRunner};
//!
//! let config = BenchConfig::builder()
//!     .imputer(ImputerFamily::DistanceKnn)
//!     .param_name("n_neighbors")
//!     .var_name("k")
//!     .build()?;
//!
//! let outcome = SweepRunner::run(&truth, &with_missing, &missing, &[1.0, 3.0, 5.0], &config)?;
//! println!("{}", outcome.results);
//! ```

pub mod config;
pub mod encoding;
pub mod error;
pub mod imputers;
pub mod injection;
pub mod noise;
pub mod sampling;
pub mod scaling;
pub mod scoring;
pub mod sweep;
pub mod types;
pub mod utils;

// Re-exports for convenient access
pub use config::{
    AttributeType, BenchConfig, BenchConfigBuilder, ConfigValidationError, ImputerFamily,
    ParamKind,
};
pub use encoding::{Codec, CodecMap, LabelEncoder};
pub use error::{BenchError, Result as BenchResult, ResultExt};
pub use imputers::{
    BayesianRidge, CustomKnnImputer, Estimator, Imputer, IterativeImputer, KnnImputer,
    KnnWeights, LinearRegression, PREDICTIONS_COLUMN, RandomForestRegressor, build_imputer,
};
pub use injection::{InjectionOutcome, MissingValueInjector};
pub use noise::NoiseGenerator;
pub use sampling::{Interval, ProbabilityPartition, ProbabilitySampler};
pub use scaling::{ColumnRange, Scaler};
pub use scoring::{ComparisonScorer, ErrorAccumulator, ImputationResult};
pub use sweep::{SweepOutcome, SweepRunner};
pub use types::{AttributeTypeMap, ColumnScore, MissingColumnMap, Table, WeightMap};
