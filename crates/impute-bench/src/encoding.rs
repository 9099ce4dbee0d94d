//! Label encoding for categorical columns.
//!
//! Distance computations only understand numbers, so categorical columns are
//! replaced by integer codes before imputation and mapped back afterwards.

use crate::error::{BenchError, Result};
use crate::types::Table;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Sorted distinct values of one column; a value's code is its position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Codec {
    classes: Vec<String>,
}

impl Codec {
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn code_of(&self, value: &str) -> Option<usize> {
        self.classes.binary_search_by(|c| c.as_str().cmp(value)).ok()
    }

    pub fn value_of(&self, code: usize) -> Option<&str> {
        self.classes.get(code).map(String::as_str)
    }
}

/// Column name → its codec.
pub type CodecMap = BTreeMap<String, Codec>;

pub struct LabelEncoder;

impl LabelEncoder {
    /// Replace each of `columns` with `Float64` codes.
    ///
    /// Values are compared by their string form, so numeric columns can be
    /// encoded too. Nulls stay null.
    pub fn encode<S: AsRef<str>>(table: &Table, columns: &[S]) -> Result<(Table, CodecMap)> {
        let mut result = table.clone();
        let mut codecs = CodecMap::new();

        for name in columns {
            let name = name.as_ref();
            let strings = string_column(table, name)?;
            let ca = strings.str()?;

            let classes: Vec<String> = ca
                .into_iter()
                .flatten()
                .map(str::to_string)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let codec = Codec { classes };

            let codes: Vec<Option<f64>> = ca
                .into_iter()
                .map(|v| v.and_then(|s| codec.code_of(s)).map(|c| c as f64))
                .collect();

            debug!("Encoded '{}' into {} classes", name, codec.classes.len());
            result.with_column(Column::new(name.into(), codes))?;
            codecs.insert(name.to_string(), codec);
        }

        Ok((result, codecs))
    }

    /// Map codes back to their original values as `String` columns.
    ///
    /// Codes are rounded to the nearest integer first, so averaged or
    /// otherwise fractional imputations land on a valid class.
    pub fn decode(table: &Table, codecs: &CodecMap) -> Result<Table> {
        let mut result = table.clone();

        for (name, codec) in codecs {
            let column = table
                .column(name)
                .map_err(|_| BenchError::ColumnNotFound(name.clone()))?;
            let floats = column.as_materialized_series().cast(&DataType::Float64)?;

            let values = floats
                .f64()?
                .into_iter()
                .map(|code| match code {
                    None => Ok(None),
                    Some(code) => decode_one(codec, code)
                        .map(|v| Some(v.to_string()))
                        .ok_or_else(|| BenchError::ImputationFailed {
                            column: name.clone(),
                            reason: format!("code {} has no class", code),
                        }),
                })
                .collect::<Result<Vec<Option<String>>>>()?;

            result.with_column(Column::new(name.as_str().into(), values))?;
        }

        Ok(result)
    }
}

fn decode_one(codec: &Codec, code: f64) -> Option<&str> {
    let rounded = code.round();
    if !rounded.is_finite() || rounded < 0.0 {
        return None;
    }
    codec.value_of(rounded as usize)
}

fn string_column(table: &Table, name: &str) -> Result<Series> {
    let column = table
        .column(name)
        .map_err(|_| BenchError::ColumnNotFound(name.to_string()))?;
    Ok(column.as_materialized_series().cast(&DataType::String)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::column_values;
    use pretty_assertions::assert_eq;

    fn strings(df: &DataFrame, name: &str) -> Vec<Option<String>> {
        df.column(name)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .map(|v| v.map(str::to_string))
            .collect()
    }

    #[test]
    fn test_encode_assigns_sorted_codes() {
        let df = df![
            "color" => ["red", "blue", "green", "blue"],
            "size" => [1.0, 2.0, 3.0, 4.0],
        ]
        .unwrap();

        let (encoded, codecs) = LabelEncoder::encode(&df, &["color"]).unwrap();
        assert_eq!(codecs["color"].classes(), &["blue", "green", "red"]);
        assert_eq!(
            column_values(&encoded, "color").unwrap(),
            vec![Some(2.0), Some(0.0), Some(1.0), Some(0.0)]
        );
        assert_eq!(encoded.column("size").unwrap().dtype(), &DataType::Float64);
    }

    #[test]
    fn test_round_trip_restores_values() {
        let df = df![
            "kind" => [Some("b"), None, Some("a"), Some("c")],
        ]
        .unwrap();

        let (encoded, codecs) = LabelEncoder::encode(&df, &["kind"]).unwrap();
        let decoded = LabelEncoder::decode(&encoded, &codecs).unwrap();
        assert_eq!(strings(&decoded, "kind"), strings(&df, "kind"));
    }

    #[test]
    fn test_decode_rounds_fractional_codes() {
        let codecs = CodecMap::from([(
            "kind".to_string(),
            Codec {
                classes: vec!["a".to_string(), "b".to_string()],
            },
        )]);
        let imputed = df!["kind" => [0.4, 0.6]].unwrap();

        let decoded = LabelEncoder::decode(&imputed, &codecs).unwrap();
        assert_eq!(
            strings(&decoded, "kind"),
            vec![Some("a".to_string()), Some("b".to_string())]
        );
    }

    #[test]
    fn test_decode_unknown_code_fails() {
        let codecs = CodecMap::from([(
            "kind".to_string(),
            Codec {
                classes: vec!["a".to_string()],
            },
        )]);
        let imputed = df!["kind" => [3.0]].unwrap();

        let result = LabelEncoder::decode(&imputed, &codecs);
        assert!(matches!(result, Err(BenchError::ImputationFailed { .. })));
    }

    #[test]
    fn test_encode_numeric_column_by_string_form() {
        let df = df!["grade" => [3i64, 1, 3, 2]].unwrap();
        let (encoded, codecs) = LabelEncoder::encode(&df, &["grade"]).unwrap();
        assert_eq!(codecs["grade"].classes(), &["1", "2", "3"]);
        assert_eq!(
            column_values(&encoded, "grade").unwrap(),
            vec![Some(2.0), Some(0.0), Some(2.0), Some(1.0)]
        );
    }

    #[test]
    fn test_encode_missing_column_fails() {
        let df = df!["a" => [1.0]].unwrap();
        assert!(matches!(
            LabelEncoder::encode(&df, &["zzz"]),
            Err(BenchError::ColumnNotFound(_))
        ));
    }
}
