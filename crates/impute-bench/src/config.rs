//! Configuration types for the imputation benchmark.
//!
//! This module provides the closed sets of imputer families, attribute types and
//! parameter kinds, plus [`BenchConfig`] built with a fluent builder.

use crate::error::BenchError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Imputation strategies that can be driven by a parameter sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ImputerFamily {
    /// k-nearest-neighbor imputation with uniform neighbor weights
    #[default]
    #[serde(rename = "kNN")]
    UniformKnn,
    /// k-nearest-neighbor imputation weighted by inverse distance
    #[serde(rename = "WkNN")]
    DistanceKnn,
    /// Chained-equations imputation with ordinary least squares
    #[serde(rename = "MICE")]
    IterativeLinear,
    /// Chained-equations imputation with Bayesian ridge regression
    #[serde(rename = "MICE BR")]
    IterativeBayesianRidge,
    /// Chained-equations imputation with a random forest regressor
    #[serde(rename = "MICE RF")]
    IterativeRandomForest,
}

impl ImputerFamily {
    /// All supported families, in their canonical order.
    pub const ALL: [ImputerFamily; 5] = [
        ImputerFamily::UniformKnn,
        ImputerFamily::DistanceKnn,
        ImputerFamily::IterativeLinear,
        ImputerFamily::IterativeBayesianRidge,
        ImputerFamily::IterativeRandomForest,
    ];

    /// Canonical short name used on the command line and in reports.
    pub fn name(&self) -> &'static str {
        match self {
            Self::UniformKnn => "kNN",
            Self::DistanceKnn => "WkNN",
            Self::IterativeLinear => "MICE",
            Self::IterativeBayesianRidge => "MICE BR",
            Self::IterativeRandomForest => "MICE RF",
        }
    }

    /// Whether the family measures distances between rows.
    ///
    /// Distance-based families are sensitive to attribute scale and get
    /// min-max scaling unless it is disabled.
    pub fn is_knn(&self) -> bool {
        matches!(self, Self::UniformKnn | Self::DistanceKnn)
    }
}

impl fmt::Display for ImputerFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ImputerFamily {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|family| family.name() == s.trim())
            .ok_or_else(|| BenchError::UnknownImputerFamily(s.to_string()))
    }
}

/// How a missing attribute's prediction is aggregated from its neighbors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    /// Discrete codes; predicted by (weighted) majority vote
    Categorical,
    /// Continuous or ordinal numbers; predicted by (weighted) averaging
    Qualitative,
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Categorical => f.write_str("categorical"),
            Self::Qualitative => f.write_str("qualitative"),
        }
    }
}

impl FromStr for AttributeType {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "categorical" => Ok(Self::Categorical),
            "qualitative" | "continuous" | "numeric" => Ok(Self::Qualitative),
            _ => Err(BenchError::UnknownAttributeType(s.to_string())),
        }
    }
}

/// Which layer of an imputer a swept hyperparameter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    /// A parameter of the imputer itself (e.g. `n_neighbors`, `max_iter`)
    #[default]
    Imputer,
    /// A parameter of the regression estimator inside an iterative imputer
    Estimator,
}

impl FromStr for ParamKind {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "imputer" => Ok(Self::Imputer),
            "estimator" => Ok(Self::Estimator),
            other => Err(BenchError::InvalidConfig(format!(
                "unknown parameter kind '{}' (expected 'imputer' or 'estimator')",
                other
            ))),
        }
    }
}

/// Configuration for a benchmark run.
///
/// Use [`BenchConfig::builder()`] to create a new configuration
/// with fluent API.
///
/// # Example
///
/// ```rust,ignore
/// use impute_bench::config::{BenchConfig, ImputerFamily};
///
/// let config = BenchConfig::builder()
///     .seed(7)
///     .imputer(ImputerFamily::DistanceKnn)
///     .param_name("n_neighbors")
///     .build()?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Seed of the single random generator threaded through a run.
    /// Default: 42
    pub seed: u64,

    /// Number of neighbors for the custom k-NN imputer.
    /// Default: 5
    pub k: usize,

    /// Whether custom k-NN votes and averages are weighted by 1/distance².
    /// Default: false
    pub weighted: bool,

    /// Imputer family driven by the sweep.
    /// Default: kNN (uniform)
    pub imputer: ImputerFamily,

    /// Layer that the swept parameter belongs to.
    /// Default: Imputer
    pub param_kind: ParamKind,

    /// Name of the swept parameter.
    /// Default: "n_neighbors"
    pub param_name: String,

    /// Label of the sweep-value column in the long result table.
    /// Default: "k"
    pub var_name: String,

    /// Whether distance-based families are min-max scaled before fitting.
    /// Default: true
    pub scale: bool,

    /// Base imputer-level parameters cloned for every sweep value.
    pub imputer_params: BTreeMap<String, f64>,

    /// Base estimator-level parameters cloned for every sweep value.
    pub estimator_params: BTreeMap<String, f64>,
}

static_assertions::assert_impl_all!(BenchConfig: Send, Sync);

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            k: 5,
            weighted: false,
            imputer: ImputerFamily::default(),
            param_kind: ParamKind::default(),
            param_name: "n_neighbors".to_string(),
            var_name: "k".to_string(),
            scale: true,
            imputer_params: BTreeMap::new(),
            estimator_params: BTreeMap::new(),
        }
    }
}

impl BenchConfig {
    /// Create a new configuration builder.
    pub fn builder() -> BenchConfigBuilder {
        BenchConfigBuilder::default()
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.k == 0 {
            return Err(ConfigValidationError::InvalidNeighbors(self.k));
        }

        if self.param_name.trim().is_empty() {
            return Err(ConfigValidationError::EmptyField("param_name".to_string()));
        }

        if self.var_name.trim().is_empty() {
            return Err(ConfigValidationError::EmptyField("var_name".to_string()));
        }

        for (name, value) in self.imputer_params.iter().chain(&self.estimator_params) {
            if !value.is_finite() {
                return Err(ConfigValidationError::NonFiniteParameter {
                    name: name.clone(),
                    value: *value,
                });
            }
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid number of neighbors: {0} (must be at least 1)")]
    InvalidNeighbors(usize),

    #[error("Field '{0}' must not be empty")]
    EmptyField(String),

    #[error("Parameter '{name}' must be finite, got {value}")]
    NonFiniteParameter { name: String, value: f64 },
}

impl From<ConfigValidationError> for BenchError {
    fn from(err: ConfigValidationError) -> Self {
        BenchError::InvalidConfig(err.to_string())
    }
}

/// Builder for [`BenchConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct BenchConfigBuilder {
    seed: Option<u64>,
    k: Option<usize>,
    weighted: Option<bool>,
    imputer: Option<ImputerFamily>,
    param_kind: Option<ParamKind>,
    param_name: Option<String>,
    var_name: Option<String>,
    scale: Option<bool>,
    imputer_params: BTreeMap<String, f64>,
    estimator_params: BTreeMap<String, f64>,
}

impl BenchConfigBuilder {
    /// Set the random seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the number of neighbors for the custom k-NN imputer.
    pub fn k(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }

    /// Enable or disable inverse squared-distance weighting.
    pub fn weighted(mut self, weighted: bool) -> Self {
        self.weighted = Some(weighted);
        self
    }

    /// Set the imputer family used by the sweep.
    pub fn imputer(mut self, family: ImputerFamily) -> Self {
        self.imputer = Some(family);
        self
    }

    /// Set the layer of the swept parameter.
    pub fn param_kind(mut self, kind: ParamKind) -> Self {
        self.param_kind = Some(kind);
        self
    }

    /// Set the name of the swept parameter.
    pub fn param_name(mut self, name: impl Into<String>) -> Self {
        self.param_name = Some(name.into());
        self
    }

    /// Set the label of the sweep-value column.
    pub fn var_name(mut self, name: impl Into<String>) -> Self {
        self.var_name = Some(name.into());
        self
    }

    /// Enable or disable min-max scaling for distance-based families.
    pub fn scale(mut self, scale: bool) -> Self {
        self.scale = Some(scale);
        self
    }

    /// Add a base imputer-level parameter.
    pub fn imputer_param(mut self, name: impl Into<String>, value: f64) -> Self {
        self.imputer_params.insert(name.into(), value);
        self
    }

    /// Add a base estimator-level parameter.
    pub fn estimator_param(mut self, name: impl Into<String>, value: f64) -> Self {
        self.estimator_params.insert(name.into(), value);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `BenchConfig` or an error if validation fails.
    pub fn build(self) -> Result<BenchConfig, ConfigValidationError> {
        let defaults = BenchConfig::default();
        let config = BenchConfig {
            seed: self.seed.unwrap_or(defaults.seed),
            k: self.k.unwrap_or(defaults.k),
            weighted: self.weighted.unwrap_or(defaults.weighted),
            imputer: self.imputer.unwrap_or_default(),
            param_kind: self.param_kind.unwrap_or_default(),
            param_name: self.param_name.unwrap_or(defaults.param_name),
            var_name: self.var_name.unwrap_or(defaults.var_name),
            scale: self.scale.unwrap_or(defaults.scale),
            imputer_params: self.imputer_params,
            estimator_params: self.estimator_params,
        };

        config.validate()?;
        Ok(config)
    }
}
