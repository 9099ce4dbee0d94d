//! CLI entry point for the imputation benchmark.

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use impute_bench::utils::{column_names, column_position, frame_to_rows, rows_to_frame, select_rows};
use impute_bench::{
    AttributeType, AttributeTypeMap, BenchConfig, ComparisonScorer, CustomKnnImputer,
    ImputerFamily, InjectionOutcome, LabelEncoder, MissingColumnMap, MissingValueInjector,
    ParamKind, Scaler, SweepRunner, Table, WeightMap,
};
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Benchmark harness for missing-data imputation strategies",
    long_about = "Removes one value per row from a complete table, imputes it back and \
                  scores the reconstruction.\n\n\
                  EXAMPLES:\n  \
                  # Custom k-NN with 7 neighbors, 30% of rows damaged\n  \
                  impute-bench -i data.csv --missing-fraction 0.3 knn -k 7\n\n  \
                  # Weighted injection and a categorical column\n  \
                  impute-bench -i data.csv --categorical color --weight color=3 --weight size=1 knn --weighted\n\n  \
                  # Custom k-NN on raw, unscaled values\n  \
                  impute-bench -i data.csv knn -k 3 --no-scale\n\n  \
                  # Sweep the neighbor count of distance-weighted kNN\n  \
                  impute-bench -i data.csv sweep --imputer WkNN --values 1,3,5,9\n\n  \
                  # Sweep random forest size inside the iterative imputer\n  \
                  impute-bench -i data.csv --json sweep --imputer 'MICE RF' --param-kind estimator \\\n    \
                  --param n_estimators --var-name trees --values 10,50,100"
)]
struct Args {
    /// Path to a CSV file with a header row and no missing values
    #[arg(short, long, global = true)]
    input: Option<String>,

    /// Columns to label-encode and treat as categorical (repeatable)
    #[arg(long = "categorical", value_name = "COLUMN", global = true)]
    categorical: Vec<String>,

    /// Injection weight of a column as `column=weight` (repeatable)
    ///
    /// Defaults to a weight of 1 for every column
    #[arg(long = "weight", value_name = "COLUMN=WEIGHT", global = true)]
    weights: Vec<String>,

    /// Fraction of rows that lose a value; the rest are used for training
    #[arg(long, default_value = "0.2", global = true)]
    missing_fraction: f64,

    /// Exact number of rows that lose a value (overrides --missing-fraction)
    #[arg(long, global = true)]
    missing_rows: Option<usize>,

    /// Seed of the random generator used for injection and tie-breaking
    #[arg(long, default_value = "42", global = true)]
    seed: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Suppress progress output (only show warnings and the final result)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output JSON to stdout instead of a table
    ///
    /// Disables all progress logs.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Impute with the mixed-type k-NN imputer and score the damaged cells
    Knn {
        /// Number of neighbors
        #[arg(short, long, default_value = "5")]
        k: usize,

        /// Weight neighbors by inverse squared distance
        #[arg(long)]
        weighted: bool,

        /// Skip min-max scaling of the continuous columns
        #[arg(long)]
        no_scale: bool,
    },

    /// Evaluate one imputer family across a range of one hyperparameter
    Sweep {
        /// Imputer family: kNN, WkNN, MICE, MICE BR or MICE RF
        #[arg(long, default_value = "kNN")]
        imputer: String,

        /// Layer the swept parameter belongs to (imputer or estimator)
        #[arg(long, default_value = "imputer")]
        param_kind: String,

        /// Name of the swept parameter
        #[arg(long = "param", default_value = "n_neighbors")]
        param_name: String,

        /// Label of the sweep-value column in the result table
        #[arg(long, default_value = "k")]
        var_name: String,

        /// Sweep values, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        values: Vec<f64>,

        /// Base imputer parameter as `name=value` (repeatable)
        #[arg(long = "imputer-param", value_name = "NAME=VALUE")]
        imputer_params: Vec<String>,

        /// Base estimator parameter as `name=value` (repeatable)
        #[arg(long = "estimator-param", value_name = "NAME=VALUE")]
        estimator_params: Vec<String>,

        /// Skip min-max scaling around the kNN families
        #[arg(long)]
        no_scale: bool,
    },
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is completely disabled to ensure
/// only JSON is written to stdout.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level, args.quiet, args.json);

    let input = args
        .input
        .as_deref()
        .ok_or_else(|| anyhow!("--input is required"))?;
    if !std::path::Path::new(input).exists() {
        return Err(anyhow!("Input file not found: {}", input));
    }

    info!("Loading dataset from: {}", input);
    let raw = load_csv(input)?;
    info!("Dataset loaded successfully: {:?}", raw.shape());

    let (truth, codecs) = LabelEncoder::encode(&raw, &args.categorical)?;
    if !codecs.is_empty() {
        debug!("Label-encoded {} columns", codecs.len());
    }

    let weights = parse_weights(&args.weights, &truth)?;
    let mut rng = StdRng::seed_from_u64(args.seed);

    let count = match args.missing_rows {
        Some(count) => count,
        None => {
            if !(0.0..=1.0).contains(&args.missing_fraction) {
                bail!(
                    "--missing-fraction must be within [0, 1], got {}",
                    args.missing_fraction
                );
            }
            (truth.height() as f64 * args.missing_fraction).round() as usize
        }
    };
    let rows = MissingValueInjector::choose_rows(truth.height(), count, &mut rng)?;
    let outcome = MissingValueInjector::inject_rows(&truth, &rows, &weights, &mut rng)?;
    for (column, _) in weights.iter() {
        debug!("'{}' lost {} values", column, outcome.count_for(column));
    }

    match args.command {
        Command::Knn {
            k,
            weighted,
            no_scale,
        } => {
            let config = BenchConfig::builder()
                .seed(args.seed)
                .k(k)
                .weighted(weighted)
                .scale(!no_scale)
                .build()?;
            run_knn(&truth, &outcome, &args.categorical, &config, args.json, &mut rng)
        }
        Command::Sweep {
            ref imputer,
            ref param_kind,
            ref param_name,
            ref var_name,
            ref values,
            ref imputer_params,
            ref estimator_params,
            no_scale,
        } => {
            let family: ImputerFamily = imputer.parse()?;
            let mut builder = BenchConfig::builder()
                .seed(args.seed)
                .imputer(family)
                .param_kind(param_kind.parse::<ParamKind>()?)
                .param_name(param_name)
                .var_name(var_name)
                .scale(!no_scale);
            for (name, value) in parse_pairs(imputer_params)? {
                builder = builder.imputer_param(name, value);
            }
            for (name, value) in parse_pairs(estimator_params)? {
                builder = builder.estimator_param(name, value);
            }
            let config = builder.build()?;

            run_sweep(&truth, &outcome, values, &config, args.json)
        }
    }
}

/// Impute the damaged rows from the untouched ones and print per-column scores.
fn run_knn(
    truth: &Table,
    outcome: &InjectionOutcome,
    categorical: &[String],
    config: &BenchConfig,
    json: bool,
    rng: &mut StdRng,
) -> Result<()> {
    let columns = column_names(truth);
    let types: AttributeTypeMap = columns
        .iter()
        .map(|c| {
            let kind = if categorical.contains(c) {
                AttributeType::Categorical
            } else {
                AttributeType::Qualitative
            };
            (c.clone(), kind)
        })
        .collect();

    let scaler = knn_scaler(truth, categorical, config.scale)?;
    let (label_table, query_table) = match &scaler {
        Some(scaler) => (scaler.apply(truth)?, scaler.apply(&outcome.table)?),
        None => (truth.clone(), outcome.table.clone()),
    };

    let truth_rows = frame_to_rows(truth, &columns)?;
    let label_rows = frame_to_rows(&label_table, &columns)?;
    let damaged_rows = frame_to_rows(&query_table, &columns)?;
    let train_idx: Vec<usize> = (0..truth.height())
        .filter(|row| !outcome.missing_columns.contains_key(row))
        .collect();

    // Query rows are renumbered from zero, so the missing map follows
    let query_missing: MissingColumnMap = outcome
        .affected_rows
        .iter()
        .zip(&outcome.picked_columns)
        .enumerate()
        .map(|(i, (_, column))| (i, column.clone()))
        .collect();

    let train = rows_to_frame(&columns, &select_rows(&label_rows, &train_idx))?;
    let query = rows_to_frame(&columns, &select_rows(&damaged_rows, &outcome.affected_rows))?;
    let real = rows_to_frame(&columns, &select_rows(&truth_rows, &outcome.affected_rows))?;

    let imputer = CustomKnnImputer::from_config(config)?;
    let predictions = imputer.predict(&train, &query, &query_missing, &types, rng)?;

    let mut filled = select_rows(&damaged_rows, &outcome.affected_rows);
    for ((row, column), prediction) in query_missing.iter().zip(predictions) {
        let position = column_position(&columns, column)?;
        filled[*row][position] = Some(prediction);
    }
    let filled = rows_to_frame(&columns, &filled)?;
    let filled = match &scaler {
        Some(scaler) => scaler.invert(&filled)?,
        None => filled,
    };

    let scores = ComparisonScorer::score(&real, &filled, &query_missing)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&scores)?);
    } else {
        println!("{}", ComparisonScorer::to_frame(&scores)?);
    }
    Ok(())
}

/// Min-max scaler over the continuous columns; category codes stay as they are.
fn knn_scaler(truth: &Table, categorical: &[String], scale: bool) -> Result<Option<Scaler>> {
    if !scale {
        return Ok(None);
    }
    let continuous: Vec<String> = column_names(truth)
        .into_iter()
        .filter(|c| !categorical.contains(c))
        .collect();
    Ok(Some(Scaler::build(truth, &continuous)?))
}

fn run_sweep(
    truth: &Table,
    outcome: &InjectionOutcome,
    values: &[f64],
    config: &BenchConfig,
    json: bool,
) -> Result<()> {
    let result = SweepRunner::run(
        truth,
        &outcome.table,
        &outcome.missing_columns,
        values,
        config,
    )?;

    if json {
        println!("{}", sweep_json(&result.results, &config.var_name)?);
    } else {
        println!("{}", result.results);
    }
    Ok(())
}

/// Long sweep table as an array of `{var_name, col, val}` records.
fn sweep_json(results: &Table, var_name: &str) -> Result<String> {
    use impute_bench::sweep::{COLUMN_LABEL, VALUE_LABEL};

    let vars = results.column(var_name)?.f64()?;
    let cols = results.column(COLUMN_LABEL)?.str()?;
    let vals = results.column(VALUE_LABEL)?.f64()?;

    let records: Vec<serde_json::Value> = vars
        .into_iter()
        .zip(cols)
        .zip(vals)
        .map(|((var, col), val)| {
            let mut record = serde_json::Map::new();
            record.insert(var_name.to_string(), serde_json::json!(var));
            record.insert(COLUMN_LABEL.to_string(), serde_json::json!(col));
            record.insert(VALUE_LABEL.to_string(), serde_json::json!(val));
            serde_json::Value::Object(record)
        })
        .collect();

    Ok(serde_json::to_string_pretty(&records)?)
}

fn load_csv(path: &str) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_infer_schema_length(Some(100))
        .with_has_header(true)
        .with_parse_options(CsvParseOptions::default().with_quote_char(Some(b'"')))
        .try_into_reader_with_file_path(Some(PathBuf::from(path)))?
        .finish()
        .with_context(|| format!("failed to parse CSV: {}", path))?;
    Ok(df)
}

/// `--weight` pairs, or weight 1 on every column when none are given.
fn parse_weights(pairs: &[String], table: &Table) -> Result<WeightMap> {
    if pairs.is_empty() {
        return Ok(WeightMap::uniform(&column_names(table)));
    }

    let mut weights = WeightMap::new();
    for pair in pairs {
        let (column, weight) = split_pair(pair)?;
        let weight: u32 = weight
            .parse()
            .with_context(|| format!("weight for '{}' is not a positive integer", column))?;
        weights.insert(column, weight);
    }
    Ok(weights)
}

fn parse_pairs(pairs: &[String]) -> Result<Vec<(String, f64)>> {
    pairs
        .iter()
        .map(|pair| {
            let (name, value) = split_pair(pair)?;
            let value: f64 = value
                .parse()
                .with_context(|| format!("value for '{}' is not a number", name))?;
            Ok((name.to_string(), value))
        })
        .collect()
}

fn split_pair(pair: &str) -> Result<(&str, &str)> {
    pair.split_once('=')
        .map(|(k, v)| (k.trim(), v.trim()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| anyhow!("expected NAME=VALUE, got '{}'", pair))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_pair() {
        assert_eq!(split_pair("age = 3").unwrap(), ("age", "3"));
        assert!(split_pair("age").is_err());
        assert!(split_pair("=3").is_err());
    }

    #[test]
    fn test_parse_weights_defaults_to_uniform() {
        let df = df!["a" => [1.0], "b" => [2.0]].unwrap();
        let weights = parse_weights(&[], &df).unwrap();
        assert_eq!(weights.len(), 2);
        assert_eq!(weights.total(), 2);
    }

    #[test]
    fn test_parse_weights_rejects_non_integer() {
        let df = df!["a" => [1.0]].unwrap();
        assert!(parse_weights(&["a=1.5".to_string()], &df).is_err());
    }

    #[test]
    fn test_knn_scaler_skips_categorical_columns() {
        let df = df!["size" => [1.0, 3.0], "color" => [0i64, 1]].unwrap();
        let scaler = knn_scaler(&df, &["color".to_string()], true)
            .unwrap()
            .unwrap();
        assert_eq!(scaler.columns().collect::<Vec<_>>(), vec!["size"]);
        assert!(knn_scaler(&df, &[], false).unwrap().is_none());
    }

    #[test]
    fn test_knn_no_scale_flag() {
        let args = Args::try_parse_from(["impute-bench", "knn", "-k", "3", "--no-scale"]).unwrap();
        assert!(matches!(
            args.command,
            Command::Knn { k: 3, weighted: false, no_scale: true }
        ));

        let args = Args::try_parse_from(["impute-bench", "knn"]).unwrap();
        assert!(matches!(args.command, Command::Knn { no_scale: false, .. }));
    }

    #[test]
    fn test_parse_pairs() {
        let pairs = parse_pairs(&["max_iter=20".to_string(), "tol=0.01".to_string()]).unwrap();
        assert_eq!(
            pairs,
            vec![("max_iter".to_string(), 20.0), ("tol".to_string(), 0.01)]
        );
    }
}
