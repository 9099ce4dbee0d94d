//! Custom error types for the imputation benchmark.
//!
//! This module provides the error hierarchy using `thiserror`. Variants fall
//! into three families:
//!
//! - configuration errors, raised eagerly before any computation starts
//! - degenerate computations (zero-range columns, singular systems)
//! - invariant violations, which indicate a defect rather than bad input
//!
//! Errors are serializable so that the CLI can emit them as JSON.

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for the imputation benchmark.
#[derive(Error, Debug)]
pub enum BenchError {
    /// Column was not found in the table.
    #[error("Column '{0}' not found in table")]
    ColumnNotFound(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// More neighbors were requested than there are candidate rows.
    #[error("k = {k} must not exceed the number of candidate rows ({available})")]
    TooManyNeighbors { k: usize, available: usize },

    /// Imputer family name outside the supported set.
    #[error("Unknown imputer family '{0}'")]
    UnknownImputerFamily(String),

    /// Attribute type other than categorical or qualitative.
    #[error("Unknown attribute type '{0}' (expected 'categorical' or 'qualitative')")]
    UnknownAttributeType(String),

    /// Hyperparameter name not understood by the selected imputer or estimator.
    #[error("Unknown parameter '{name}' for {target}")]
    UnknownParameter { name: String, target: String },

    /// A column referenced by the missing-column map has no declared type.
    #[error("No attribute type declared for column '{0}'")]
    MissingAttributeType(String),

    /// The weight map has no entries.
    #[error("Weight map must contain at least one column")]
    EmptyWeightMap,

    /// A weight that is zero (or otherwise unusable).
    #[error("Weight for column '{column}' must be positive, got {weight}")]
    InvalidWeight { column: String, weight: u32 },

    /// Min-max scaling of a constant column.
    #[error("Column '{0}' has zero range and cannot be min-max scaled")]
    ZeroRange(String),

    /// A numeric routine could not produce a result.
    #[error("Degenerate computation: {0}")]
    DegenerateComputation(String),

    /// Internal invariant broken; indicates a defect.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Imputation failed.
    #[error("Failed to impute missing values in column '{column}': {reason}")]
    ImputationFailed { column: String, reason: String },

    /// `transform` was called before `fit`.
    #[error("Imputer has not been fitted")]
    NotFitted,

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<BenchError>,
    },
}

impl BenchError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        BenchError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Get a stable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::TooManyNeighbors { .. } => "TOO_MANY_NEIGHBORS",
            Self::UnknownImputerFamily(_) => "UNKNOWN_IMPUTER_FAMILY",
            Self::UnknownAttributeType(_) => "UNKNOWN_ATTRIBUTE_TYPE",
            Self::UnknownParameter { .. } => "UNKNOWN_PARAMETER",
            Self::MissingAttributeType(_) => "MISSING_ATTRIBUTE_TYPE",
            Self::EmptyWeightMap => "EMPTY_WEIGHT_MAP",
            Self::InvalidWeight { .. } => "INVALID_WEIGHT",
            Self::ZeroRange(_) => "ZERO_RANGE",
            Self::DegenerateComputation(_) => "DEGENERATE_COMPUTATION",
            Self::InvariantViolation(_) => "INVARIANT_VIOLATION",
            Self::ImputationFailed { .. } => "IMPUTATION_FAILED",
            Self::NotFitted => "NOT_FITTED",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Check if this error was raised by configuration validation.
    ///
    /// Configuration errors are detected before any row is processed.
    pub fn is_configuration_error(&self) -> bool {
        match self {
            Self::ColumnNotFound(_)
            | Self::InvalidConfig(_)
            | Self::TooManyNeighbors { .. }
            | Self::UnknownImputerFamily(_)
            | Self::UnknownAttributeType(_)
            | Self::UnknownParameter { .. }
            | Self::MissingAttributeType(_)
            | Self::EmptyWeightMap
            | Self::InvalidWeight { .. } => true,
            Self::WithContext { source, .. } => source.is_configuration_error(),
            _ => false,
        }
    }
}

/// Errors are serialized as a struct with `code` and `message` fields.
impl Serialize for BenchError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("BenchError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for benchmark operations.
pub type Result<T> = std::result::Result<T, BenchError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| BenchError::Polars(e).with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(BenchError::NotFitted.error_code(), "NOT_FITTED");
        assert_eq!(
            BenchError::TooManyNeighbors { k: 5, available: 3 }.error_code(),
            "TOO_MANY_NEIGHBORS"
        );
    }

    #[test]
    fn test_is_configuration_error() {
        assert!(BenchError::EmptyWeightMap.is_configuration_error());
        assert!(BenchError::UnknownImputerFamily("SVD".to_string()).is_configuration_error());
        assert!(!BenchError::ZeroRange("a".to_string()).is_configuration_error());
        assert!(!BenchError::InvariantViolation("x".to_string()).is_configuration_error());
    }

    #[test]
    fn test_too_many_neighbors_message() {
        let error = BenchError::TooManyNeighbors { k: 7, available: 4 };
        assert!(error.to_string().contains("k = 7"));
        assert!(error.to_string().contains('4'));
    }

    #[test]
    fn test_error_serialization() {
        let error = BenchError::ColumnNotFound("Age".to_string());
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("COLUMN_NOT_FOUND"));
        assert!(json.contains("Age"));
    }

    #[test]
    fn test_with_context() {
        let error = BenchError::ZeroRange("b".to_string()).with_context("While scaling");
        assert!(error.to_string().contains("While scaling"));
        assert_eq!(error.error_code(), "ZERO_RANGE");
    }
}
