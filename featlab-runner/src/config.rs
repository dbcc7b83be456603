//! Run configuration loaded from TOML.
//!
//! Every field has a default, so a config file only names what it changes:
//!
//! ```toml
//! start_date = "2022-01-03"
//! max_workers = 4
//! industry_benchmark = "universe"
//!
//! [provider]
//! master_path = "data/stock_master.json"
//! series_dir = "data/series"
//!
//! [features]
//! ma_windows = [5, 20, 60]
//! ```

use chrono::{Months, NaiveDate};
use featlab_core::config::{ConfigError, FeatureConfig};
use featlab_core::domain::IndustryLevel;
use featlab_core::industry::{check_levels, IndustryBenchmark};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing_subscriber::{fmt, EnvFilter};

pub const DEFAULT_BENCHMARK_ID: &str = "069500";
pub const DEFAULT_MAX_WORKERS: usize = 8;
/// Calendar months fetched when no start date is configured.
pub const DEFAULT_LOOKBACK_MONTHS: u32 = 36;

#[derive(Debug, Error)]
pub enum RunConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid feature config: {0}")]
    Feature(#[from] ConfigError),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Local-file provider locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub master_path: PathBuf,
    pub series_dir: PathBuf,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            master_path: PathBuf::from("data/stock_master.json"),
            series_dir: PathBuf::from("data/series"),
        }
    }
}

/// Artifact locations. File names are relative to `dir`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub features_file: String,
    pub metadata_file: String,
    /// `None` skips the industry table.
    pub industry_file: Option<String>,
    /// `None` skips the master table.
    pub master_file: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("cache"),
            features_file: "features.parquet".into(),
            metadata_file: "features_meta.json".into(),
            industry_file: Some("industry.parquet".into()),
            master_file: Some("stock_master.parquet".into()),
        }
    }
}

impl OutputConfig {
    pub fn features_path(&self) -> PathBuf {
        self.dir.join(&self.features_file)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(&self.metadata_file)
    }

    pub fn industry_path(&self) -> Option<PathBuf> {
        self.industry_file.as_ref().map(|f| self.dir.join(f))
    }

    pub fn master_path(&self) -> Option<PathBuf> {
        self.master_file.as_ref().map(|f| self.dir.join(f))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Pretty,
        }
    }
}

impl LoggingConfig {
    /// Install the global tracing subscriber. `RUST_LOG` overrides `level`.
    ///
    /// A second call is a no-op.
    pub fn init(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

        let _ = match self.format {
            LogFormat::Json => fmt().json().with_env_filter(filter).try_init(),
            LogFormat::Pretty => fmt().with_env_filter(filter).try_init(),
        };
    }
}

/// Configuration for one feature-cache build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Inclusive; defaults to `DEFAULT_LOOKBACK_MONTHS` before `end_date`.
    pub start_date: Option<NaiveDate>,
    /// Inclusive; defaults to today (UTC).
    pub end_date: Option<NaiveDate>,
    /// Universe snapshot date passed to the provider.
    pub as_of: Option<NaiveDate>,
    /// Worker pool size. 1 runs every instrument inline, in order.
    pub max_workers: usize,
    pub benchmark_id: String,
    pub industry_benchmark: IndustryBenchmark,
    pub levels: Vec<IndustryLevel>,
    pub adjusted: bool,
    /// Restrict the universe to one market segment.
    pub market: Option<String>,
    /// Keep only the first N instruments (0 keeps all).
    pub test_limit: usize,
    /// How long to wait for in-flight tasks after a failure.
    pub cancel_grace_secs: u64,
    pub features: FeatureConfig,
    pub provider: ProviderConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            start_date: None,
            end_date: None,
            as_of: None,
            max_workers: DEFAULT_MAX_WORKERS,
            benchmark_id: DEFAULT_BENCHMARK_ID.into(),
            industry_benchmark: IndustryBenchmark::Universe,
            levels: IndustryLevel::ALL.to_vec(),
            adjusted: true,
            market: None,
            test_limit: 0,
            cancel_grace_secs: 5,
            features: FeatureConfig::default(),
            provider: ProviderConfig::default(),
            output: OutputConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, RunConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, RunConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| RunConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), RunConfigError> {
        self.features.validate()?;
        if self.max_workers == 0 {
            return Err(RunConfigError::Invalid {
                field: "max_workers",
                reason: "must be at least 1".into(),
            });
        }
        if self.benchmark_id.trim().is_empty() {
            return Err(RunConfigError::Invalid {
                field: "benchmark_id",
                reason: "must not be blank".into(),
            });
        }
        check_levels(&self.levels).map_err(|e| RunConfigError::Invalid {
            field: "levels",
            reason: e.to_string(),
        })?;
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(RunConfigError::Invalid {
                    field: "start_date",
                    reason: format!("{start} is after end_date {end}"),
                });
            }
        }
        if self.output.features_file.trim().is_empty() || self.output.metadata_file.trim().is_empty() {
            return Err(RunConfigError::Invalid {
                field: "output",
                reason: "file names must not be blank".into(),
            });
        }
        Ok(())
    }

    /// Concrete `(start, end)` range, filling defaults relative to `today`.
    pub fn date_range(&self, today: NaiveDate) -> Result<(NaiveDate, NaiveDate), RunConfigError> {
        let end = self.end_date.unwrap_or(today);
        let start = match self.start_date {
            Some(start) => start,
            None => end
                .checked_sub_months(Months::new(DEFAULT_LOOKBACK_MONTHS))
                .ok_or_else(|| RunConfigError::Invalid {
                    field: "end_date",
                    reason: format!("{end} is too early for the default lookback"),
                })?,
        };
        if start > end {
            return Err(RunConfigError::Invalid {
                field: "start_date",
                reason: format!("{start} is after end_date {end}"),
            });
        }
        Ok((start, end))
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_secs(self.cancel_grace_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn empty_toml_is_default() {
        let cfg = RunConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, RunConfig::default());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_toml_overrides_fields() {
        let cfg = RunConfig::from_toml_str(
            r#"
            start_date = "2023-01-02"
            max_workers = 1
            industry_benchmark = "instrument"
            levels = ["L", "LM"]

            [features]
            ma_windows = [5, 20]

            [logging]
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.start_date, Some(d(2023, 1, 2)));
        assert_eq!(cfg.max_workers, 1);
        assert_eq!(cfg.industry_benchmark, IndustryBenchmark::Instrument);
        assert_eq!(cfg.levels, vec![IndustryLevel::Large, IndustryLevel::LargeMid]);
        assert_eq!(cfg.features.ma_windows, vec![5, 20]);
        assert_eq!(cfg.features.rs_window, 200);
        assert_eq!(cfg.logging.format, LogFormat::Json);
        assert_eq!(cfg.benchmark_id, DEFAULT_BENCHMARK_ID);
    }

    #[test]
    fn unknown_benchmark_mode_is_rejected() {
        assert!(RunConfig::from_toml_str(r#"industry_benchmark = "kospi""#).is_err());
    }

    #[test]
    fn zero_workers_is_invalid() {
        let cfg = RunConfig {
            max_workers: 0,
            ..RunConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(RunConfigError::Invalid { field: "max_workers", .. })
        ));
    }

    #[test]
    fn finest_level_without_parents_is_invalid() {
        let cfg = RunConfig {
            levels: vec![IndustryLevel::LargeMidSmall],
            ..RunConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(RunConfigError::Invalid { field: "levels", .. })
        ));
    }

    #[test]
    fn default_range_looks_back_three_years() {
        let cfg = RunConfig::default();
        let (start, end) = cfg.date_range(d(2024, 6, 30)).unwrap();
        assert_eq!(end, d(2024, 6, 30));
        assert_eq!(start, d(2021, 6, 30));
    }

    #[test]
    fn inverted_range_is_invalid() {
        let cfg = RunConfig {
            start_date: Some(d(2024, 2, 1)),
            end_date: Some(d(2024, 1, 1)),
            ..RunConfig::default()
        };
        assert!(cfg.validate().is_err());
        assert!(cfg.date_range(d(2024, 3, 1)).is_err());
    }

    #[test]
    fn output_paths_join_dir() {
        let out = OutputConfig::default();
        assert_eq!(out.features_path(), PathBuf::from("cache/features.parquet"));
        assert_eq!(out.industry_path(), Some(PathBuf::from("cache/industry.parquet")));
    }
}
