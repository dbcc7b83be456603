//! Release checks on produced artifacts.
//!
//! Each artifact is checked independently and every failure is collected, so
//! one report lists everything wrong with a cache directory.

use polars::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::OutputConfig;
use crate::metadata::{RunMetadata, RunStatus};

/// Columns the universe feature table must carry.
pub const REQUIRED_FEATURE_COLUMNS: [&str; 7] =
    ["Date", "Ticker", "Open", "High", "Low", "Close", "Volume"];
pub const REQUIRED_INDUSTRY_COLUMNS: [&str; 3] = ["Date", "Level", "IndustryClose"];
pub const REQUIRED_MASTER_COLUMNS: [&str; 3] = ["Code", "Name", "Market"];

/// Fraction of the metadata's instrument count the table must cover.
pub const MIN_TICKER_COVERAGE: f64 = 0.8;
/// Largest tolerated share of nulls in Date, Ticker and Close.
pub const MAX_CRITICAL_NULL_PCT: f64 = 5.0;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{0} not found")]
    Missing(PathBuf),

    #[error("{0} is empty")]
    EmptyFile(PathBuf),

    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("metadata JSON is invalid: {0}")]
    InvalidMetadata(#[from] serde_json::Error),

    #[error("metadata reports a failed run: stage={stage}, ticker={ticker}, error={message}")]
    RunFailed {
        stage: String,
        ticker: String,
        message: String,
    },

    #[error("{path} is not readable parquet: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: PolarsError,
    },

    #[error("{table} has no rows")]
    NoRows { table: &'static str },

    #[error("{table} is missing required columns: {columns:?}")]
    MissingColumns {
        table: &'static str,
        columns: Vec<String>,
    },

    #[error("too many nulls in {column}: {count} ({pct:.2}%)")]
    TooManyNulls {
        column: &'static str,
        count: usize,
        pct: f64,
    },

    #[error("{0} Close values are <= 0")]
    NonPositiveClose(usize),

    #[error("{0} Volume values are negative")]
    NegativeVolume(usize),

    #[error("found {0} rows sharing a Date+Ticker pair")]
    DuplicateRows(usize),

    #[error("ticker count too low: {found} (need at least {min})")]
    TooFewTickers { found: usize, min: usize },

    #[error("too few tickers in data: {found} (metadata lists {expected})")]
    IncompleteCoverage { found: usize, expected: usize },

    #[error("column {column}: {source}")]
    Column {
        column: &'static str,
        #[source]
        source: PolarsError,
    },
}

#[derive(Debug, Clone)]
pub struct ValidationOptions {
    pub min_tickers: usize,
    /// Fail when the industry table is absent instead of skipping it.
    pub require_industry: bool,
    pub check_master: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            min_tickers: 1,
            require_industry: false,
            check_master: true,
        }
    }
}

/// Summary of a valid universe feature table.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSummary {
    pub rows: usize,
    pub tickers: usize,
    pub dates: usize,
}

#[derive(Debug)]
pub struct SectionOutcome {
    pub section: &'static str,
    pub result: Result<String, ValidationError>,
}

#[derive(Debug, Default)]
pub struct ValidationReport {
    pub sections: Vec<SectionOutcome>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.sections.iter().all(|s| s.result.is_ok())
    }

    pub fn errors(&self) -> impl Iterator<Item = (&'static str, &ValidationError)> {
        self.sections
            .iter()
            .filter_map(|s| s.result.as_ref().err().map(|e| (s.section, e)))
    }

    fn push(&mut self, section: &'static str, result: Result<String, ValidationError>) {
        match &result {
            Ok(summary) => tracing::info!(section, %summary, "check passed"),
            Err(e) => tracing::error!(section, error = %e, "check failed"),
        }
        self.sections.push(SectionOutcome { section, result });
    }
}

fn check_file(path: &Path) -> Result<u64, ValidationError> {
    let meta = fs::metadata(path).map_err(|_| ValidationError::Missing(path.to_path_buf()))?;
    if !meta.is_file() {
        return Err(ValidationError::Missing(path.to_path_buf()));
    }
    if meta.len() == 0 {
        return Err(ValidationError::EmptyFile(path.to_path_buf()));
    }
    Ok(meta.len())
}

/// Load the metadata document and require a successful run.
pub fn load_success_metadata(path: &Path) -> Result<RunMetadata, ValidationError> {
    check_file(path)?;
    let text = fs::read_to_string(path).map_err(|source| ValidationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let meta: RunMetadata = serde_json::from_str(&text)?;
    if meta.run_status != RunStatus::Success {
        let error = meta.error.as_ref();
        return Err(ValidationError::RunFailed {
            stage: error.map(|e| e.stage.clone()).unwrap_or_default(),
            ticker: error.and_then(|e| e.ticker.clone()).unwrap_or_default(),
            message: error.map(|e| e.message.clone()).unwrap_or_default(),
        });
    }
    Ok(meta)
}

pub fn read_parquet(path: &Path) -> Result<DataFrame, ValidationError> {
    check_file(path)?;
    let file = fs::File::open(path).map_err(|source| ValidationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    ParquetReader::new(file)
        .finish()
        .map_err(|source| ValidationError::Unreadable {
            path: path.to_path_buf(),
            source,
        })
}

fn require_columns(
    df: &DataFrame,
    table: &'static str,
    required: &[&str],
) -> Result<(), ValidationError> {
    let missing: Vec<String> = required
        .iter()
        .filter(|c| df.column(c).is_err())
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::MissingColumns {
            table,
            columns: missing,
        });
    }
    if df.height() == 0 {
        return Err(ValidationError::NoRows { table });
    }
    Ok(())
}

fn cast_column(
    df: &DataFrame,
    column: &'static str,
    dtype: &DataType,
) -> Result<Column, ValidationError> {
    df.column(column)
        .and_then(|c| c.cast(dtype))
        .map_err(|source| ValidationError::Column { column, source })
}

/// Structure, quality and completeness checks on the universe feature table.
pub fn check_feature_table(
    df: &DataFrame,
    meta: &RunMetadata,
    min_tickers: usize,
) -> Result<FeatureSummary, ValidationError> {
    require_columns(df, "feature table", &REQUIRED_FEATURE_COLUMNS)?;
    let rows = df.height();

    for column in ["Date", "Ticker", "Close"] {
        let count = df
            .column(column)
            .map_err(|source| ValidationError::Column { column, source })?
            .null_count();
        let pct = count as f64 / rows as f64 * 100.0;
        if pct > MAX_CRITICAL_NULL_PCT {
            return Err(ValidationError::TooManyNulls { column, count, pct });
        }
    }

    let close = cast_column(df, "Close", &DataType::Float64)?;
    let close = close
        .f64()
        .map_err(|source| ValidationError::Column { column: "Close", source })?;
    let non_positive = close.into_iter().flatten().filter(|&c| c <= 0.0).count();
    if non_positive > 0 {
        return Err(ValidationError::NonPositiveClose(non_positive));
    }

    let volume = cast_column(df, "Volume", &DataType::Float64)?;
    let volume = volume
        .f64()
        .map_err(|source| ValidationError::Column { column: "Volume", source })?;
    let negative = volume.into_iter().flatten().filter(|&v| v < 0.0).count();
    if negative > 0 {
        return Err(ValidationError::NegativeVolume(negative));
    }

    let dates = cast_column(df, "Date", &DataType::String)?;
    let dates = dates
        .str()
        .map_err(|source| ValidationError::Column { column: "Date", source })?;
    let tickers = cast_column(df, "Ticker", &DataType::String)?;
    let tickers = tickers
        .str()
        .map_err(|source| ValidationError::Column { column: "Ticker", source })?;

    let mut pairs: HashMap<(Option<&str>, Option<&str>), usize> = HashMap::with_capacity(rows);
    let mut distinct_tickers: HashSet<&str> = HashSet::new();
    let mut distinct_dates: HashSet<&str> = HashSet::new();
    for (date, ticker) in dates.into_iter().zip(tickers.into_iter()) {
        *pairs.entry((date, ticker)).or_default() += 1;
        if let Some(t) = ticker {
            distinct_tickers.insert(t);
        }
        if let Some(d) = date {
            distinct_dates.insert(d);
        }
    }
    let duplicated: usize = pairs.values().filter(|&&n| n > 1).sum();
    if duplicated > 0 {
        return Err(ValidationError::DuplicateRows(duplicated));
    }

    let found = distinct_tickers.len();
    if found < min_tickers.max(1) {
        return Err(ValidationError::TooFewTickers {
            found,
            min: min_tickers.max(1),
        });
    }
    let expected = meta.ticker_count;
    if expected > 0 && (found as f64) < expected as f64 * MIN_TICKER_COVERAGE {
        return Err(ValidationError::IncompleteCoverage { found, expected });
    }
    if meta.rows.is_some_and(|r| r != rows) {
        tracing::warn!(rows, metadata_rows = ?meta.rows, "row count differs from metadata");
    }

    Ok(FeatureSummary {
        rows,
        tickers: found,
        dates: distinct_dates.len(),
    })
}

/// Validate every artifact named by `output`.
pub fn validate_artifacts(output: &OutputConfig, options: &ValidationOptions) -> ValidationReport {
    let mut report = ValidationReport::default();

    let universe = load_success_metadata(&output.metadata_path()).and_then(|meta| {
        let path = output.features_path();
        let bytes = check_file(&path)?;
        let df = read_parquet(&path)?;
        let summary = check_feature_table(&df, &meta, options.min_tickers)?;
        Ok(format!(
            "{} rows, {} tickers, {} dates, {:.2} MB",
            summary.rows,
            summary.tickers,
            summary.dates,
            bytes as f64 / (1024.0 * 1024.0)
        ))
    });
    report.push("features", universe);

    match output.industry_path() {
        Some(path) if path.exists() => {
            let result = read_parquet(&path).and_then(|df| {
                require_columns(&df, "industry table", &REQUIRED_INDUSTRY_COLUMNS)?;
                Ok(format!("{} rows", df.height()))
            });
            report.push("industry", result);
        }
        Some(path) if options.require_industry => {
            report.push("industry", Err(ValidationError::Missing(path)));
        }
        _ => tracing::info!("industry table not present; skipped"),
    }

    if options.check_master {
        if let Some(path) = output.master_path() {
            let result = read_parquet(&path).and_then(|df| {
                require_columns(&df, "instrument master", &REQUIRED_MASTER_COLUMNS)?;
                Ok(format!("{} instruments", df.height()))
            });
            report.push("master", result);
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::metadata::MetadataAssembler;
    use chrono::NaiveDate;

    fn meta(tickers: usize) -> RunMetadata {
        let d = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut a = MetadataAssembler::start(&RunConfig::default(), "local", d, d);
        let ids: Vec<String> = (0..tickers).map(|i| format!("{i:06}")).collect();
        a.record_universe(&ids);
        a.finalize_success()
    }

    fn frame(dates: Vec<i32>, tickers: Vec<&str>, closes: Vec<i64>, volumes: Vec<i64>) -> DataFrame {
        let n = dates.len();
        DataFrame::new(vec![
            Column::new("Date".into(), dates).cast(&DataType::Date).unwrap(),
            Column::new("Ticker".into(), tickers),
            Column::new("Open".into(), vec![Option::<i64>::None; n]),
            Column::new("High".into(), vec![Option::<i64>::None; n]),
            Column::new("Low".into(), vec![Option::<i64>::None; n]),
            Column::new("Close".into(), closes),
            Column::new("Volume".into(), volumes),
        ])
        .unwrap()
    }

    #[test]
    fn clean_table_passes() {
        let df = frame(
            vec![19_000, 19_001, 19_000, 19_001],
            vec!["000001", "000001", "000002", "000002"],
            vec![100, 101, 50, 51],
            vec![10, 0, 5, 5],
        );
        let summary = check_feature_table(&df, &meta(2), 2).unwrap();
        assert_eq!(summary, FeatureSummary { rows: 4, tickers: 2, dates: 2 });
    }

    #[test]
    fn duplicate_pairs_are_rejected() {
        let df = frame(
            vec![19_000, 19_000, 19_001],
            vec!["000001", "000001", "000001"],
            vec![100, 100, 101],
            vec![1, 1, 1],
        );
        let err = check_feature_table(&df, &meta(1), 1).unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateRows(2)), "{err}");
    }

    #[test]
    fn non_positive_close_is_rejected() {
        let df = frame(vec![19_000], vec!["000001"], vec![0], vec![1]);
        assert!(matches!(
            check_feature_table(&df, &meta(1), 1),
            Err(ValidationError::NonPositiveClose(1))
        ));
    }

    #[test]
    fn negative_volume_is_rejected() {
        let df = frame(vec![19_000], vec!["000001"], vec![10], vec![-1]);
        assert!(matches!(
            check_feature_table(&df, &meta(1), 1),
            Err(ValidationError::NegativeVolume(1))
        ));
    }

    #[test]
    fn coverage_below_eighty_percent_is_rejected() {
        let df = frame(
            vec![19_000, 19_000, 19_000],
            vec!["000001", "000002", "000003"],
            vec![1, 1, 1],
            vec![1, 1, 1],
        );
        let err = check_feature_table(&df, &meta(4), 1).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::IncompleteCoverage { found: 3, expected: 4 }
        ));
        assert!(check_feature_table(&df, &meta(3), 1).is_ok());
    }

    #[test]
    fn exactly_eighty_percent_coverage_passes() {
        let df = frame(
            vec![19_000; 4],
            vec!["000001", "000002", "000003", "000004"],
            vec![1; 4],
            vec![1; 4],
        );
        assert!(check_feature_table(&df, &meta(5), 1).is_ok());
    }

    #[test]
    fn minimum_ticker_count_is_enforced() {
        let df = frame(vec![19_000], vec!["000001"], vec![1], vec![1]);
        assert!(matches!(
            check_feature_table(&df, &meta(1), 5),
            Err(ValidationError::TooFewTickers { found: 1, min: 5 })
        ));
    }

    #[test]
    fn missing_columns_are_listed() {
        let df = DataFrame::new(vec![Column::new("Date".into(), vec![1i32])]).unwrap();
        match check_feature_table(&df, &meta(1), 1) {
            Err(ValidationError::MissingColumns { columns, .. }) => {
                assert!(columns.contains(&"Ticker".to_string()));
                assert!(!columns.contains(&"Date".to_string()));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn missing_directory_reports_every_section() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputConfig {
            dir: dir.path().join("absent"),
            ..OutputConfig::default()
        };
        let report = validate_artifacts(&output, &ValidationOptions::default());
        assert!(!report.is_ok());
        let sections: Vec<&str> = report.errors().map(|(s, _)| s).collect();
        assert_eq!(sections, vec!["features", "master"]);
    }
}
