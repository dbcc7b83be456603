//! Run metadata and its single-writer assembler.
//!
//! The orchestrator owns one `MetadataAssembler` per run. Worker tasks never
//! touch it: they report through the result channel and the coordinating
//! thread records what they report. Finalizing consumes the assembler, so a
//! run is finalized exactly once, as a success or as a failure.

use chrono::{DateTime, NaiveDate, Utc};
use featlab_core::config::FeatureConfig;
use featlab_core::domain::IndustryLevel;
use featlab_core::industry::{IndustryBenchmark, UNIVERSE_BENCHMARK_METHOD};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::config::RunConfig;
use crate::orchestrator::RunError;

/// Decimal places of the cross-sectional percentile ranks.
pub const PERCENTILE_PRECISION: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunCounts {
    pub universe: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Tasks that observed cancellation before doing any work.
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MansfieldMeta {
    pub benchmark_ticker: String,
    pub sma_window: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiTimeframeMeta {
    pub benchmark_ticker: String,
    pub windows: BTreeMap<String, usize>,
    pub percentile_precision: u32,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorMeta {
    pub moving_averages: Vec<usize>,
    pub volume_moving_averages: Vec<usize>,
    pub mansfield_rs: MansfieldMeta,
    pub mrs_multi_timeframe: MultiTimeframeMeta,
    pub new_high_1y: BTreeMap<String, usize>,
    pub adjusted: bool,
}

impl IndicatorMeta {
    pub fn new(features: &FeatureConfig, benchmark_id: &str, adjusted: bool) -> Self {
        Self {
            moving_averages: features.ma_windows.clone(),
            volume_moving_averages: features.volume_ma_windows.clone(),
            mansfield_rs: MansfieldMeta {
                benchmark_ticker: benchmark_id.to_string(),
                sma_window: features.rs_window,
            },
            mrs_multi_timeframe: MultiTimeframeMeta {
                benchmark_ticker: benchmark_id.to_string(),
                windows: features
                    .mrs_windows
                    .iter()
                    .map(|m| (m.name.clone(), m.window))
                    .collect(),
                percentile_precision: PERCENTILE_PRECISION,
                description: "Cross-sectional percentile ranks (0-100.0) per date".into(),
            },
            new_high_1y: BTreeMap::from([(
                "window_trading_days".to_string(),
                features.new_high_window,
            )]),
            adjusted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BenchmarkStatus {
    Available,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkMeta {
    pub ticker: String,
    pub status: BenchmarkStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// How the industry relative-strength benchmark was built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndustryBenchmarkMeta {
    #[serde(rename = "type")]
    pub kind: IndustryBenchmark,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticker: Option<String>,
}

impl IndustryBenchmarkMeta {
    pub fn new(kind: IndustryBenchmark, benchmark_id: &str) -> Self {
        match kind {
            IndustryBenchmark::Universe => Self {
                kind,
                method: Some(UNIVERSE_BENCHMARK_METHOD.into()),
                ticker: None,
            },
            IndustryBenchmark::Instrument => Self {
                kind,
                method: None,
                ticker: Some(benchmark_id.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndustryMeta {
    pub levels: Vec<IndustryLevel>,
    pub index_method: String,
    pub benchmark: IndustryBenchmarkMeta,
    pub sma_window: usize,
    pub rows: usize,
    pub industries: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFileMeta {
    pub path: String,
    pub generated: bool,
    pub rows: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_mb: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMeta {
    pub stage: String,
    pub ticker: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunArgs {
    pub adjusted: bool,
    pub max_workers: usize,
    pub test_limit: usize,
    pub market: Option<String>,
    pub industry_benchmark: IndustryBenchmark,
    pub levels: Vec<IndustryLevel>,
    pub output: String,
    pub meta_output: String,
    pub industry_output: Option<String>,
    pub master_output: Option<String>,
}

impl RunArgs {
    pub fn new(config: &RunConfig) -> Self {
        let show = |p: std::path::PathBuf| p.display().to_string();
        Self {
            adjusted: config.adjusted,
            max_workers: config.max_workers,
            test_limit: config.test_limit,
            market: config.market.clone(),
            industry_benchmark: config.industry_benchmark,
            levels: config.levels.clone(),
            output: show(config.output.features_path()),
            meta_output: show(config.output.metadata_path()),
            industry_output: config.output.industry_path().map(show),
            master_output: config.output.master_path().map(show),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvMeta {
    pub crate_version: String,
    pub os: String,
    pub arch: String,
}

impl EnvMeta {
    pub fn current() -> Self {
        Self {
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }
}

/// Structured run report, serialized at the process boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub generated_at_utc: DateTime<Utc>,
    pub run_status: RunStatus,
    pub provider: ProviderInfo,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub tickers: Vec<String>,
    #[serde(default)]
    pub ticker_count: usize,
    #[serde(default)]
    pub counts: RunCounts,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<String>,
    pub indicators: IndicatorMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub benchmark: Option<BenchmarkMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<IndustryMeta>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data_files: BTreeMap<String, DataFileMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorMeta>,
    pub args: RunArgs,
    #[serde(default)]
    pub timing_seconds: BTreeMap<String, f64>,
    pub env: EnvMeta,
}

impl RunMetadata {
    pub fn is_success(&self) -> bool {
        self.run_status == RunStatus::Success
    }

    /// Attach a written artifact. Persistence happens after finalization, so
    /// this is the one mutation a finalized report accepts.
    pub fn record_data_file(&mut self, name: &str, file: DataFileMeta) {
        self.data_files.insert(name.to_string(), file);
    }

    pub fn record_timing(&mut self, stage: &str, elapsed: Duration) {
        self.timing_seconds.insert(stage.to_string(), round4(elapsed.as_secs_f64()));
    }
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

/// Accumulates a run's diagnostics on the coordinating thread.
#[derive(Debug)]
pub struct MetadataAssembler {
    meta: RunMetadata,
    started: Instant,
}

impl MetadataAssembler {
    pub fn start(
        config: &RunConfig,
        provider_name: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Self {
        Self {
            meta: RunMetadata {
                generated_at_utc: Utc::now(),
                run_status: RunStatus::Running,
                provider: ProviderInfo {
                    name: provider_name.to_string(),
                },
                start_date,
                end_date,
                tickers: Vec::new(),
                ticker_count: 0,
                counts: RunCounts::default(),
                rows: None,
                columns: Vec::new(),
                features: config.features.feature_names(),
                indicators: IndicatorMeta::new(&config.features, &config.benchmark_id, config.adjusted),
                benchmark: None,
                industry: None,
                data_files: BTreeMap::new(),
                dataset_hash: None,
                error: None,
                args: RunArgs::new(config),
                timing_seconds: BTreeMap::new(),
                env: EnvMeta::current(),
            },
            started: Instant::now(),
        }
    }

    pub fn record_universe(&mut self, instrument_ids: &[String]) {
        self.meta.tickers = instrument_ids.to_vec();
        self.meta.ticker_count = instrument_ids.len();
        self.meta.counts.universe = instrument_ids.len();
    }

    pub fn record_benchmark(&mut self, benchmark: BenchmarkMeta) {
        self.meta.benchmark = Some(benchmark);
    }

    pub fn record_counts(&mut self, succeeded: usize, failed: usize, skipped: usize) {
        self.meta.counts.succeeded = succeeded;
        self.meta.counts.failed = failed;
        self.meta.counts.skipped = skipped;
    }

    pub fn record_table(&mut self, rows: usize, columns: Vec<String>, dataset_hash: String) {
        self.meta.rows = Some(rows);
        self.meta.columns = columns;
        self.meta.dataset_hash = Some(dataset_hash);
    }

    pub fn record_industry(&mut self, industry: IndustryMeta) {
        self.meta.industry = Some(industry);
    }

    pub fn record_timing(&mut self, stage: &str, elapsed: Duration) {
        self.meta.record_timing(stage, elapsed);
    }

    fn finish(mut self, status: RunStatus) -> RunMetadata {
        let total = self.started.elapsed();
        self.meta.record_timing("total", total);
        self.meta.run_status = status;
        self.meta
    }

    pub fn finalize_success(self) -> RunMetadata {
        self.finish(RunStatus::Success)
    }

    /// Failure report: the table-level fields are dropped so nothing in the
    /// document describes output that was not produced.
    pub fn finalize_failure(mut self, error: &RunError) -> RunMetadata {
        self.meta.error = Some(ErrorMeta {
            stage: error.stage.to_string(),
            ticker: error.instrument.clone(),
            kind: error.kind.type_name().to_string(),
            message: error.to_string(),
        });
        self.meta.rows = None;
        self.meta.columns.clear();
        self.meta.dataset_hash = None;
        self.meta.industry = None;
        self.finish(RunStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::{RunErrorKind, Stage};
    use featlab_core::ProviderError;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn assembler() -> MetadataAssembler {
        MetadataAssembler::start(&RunConfig::default(), "local", d(1), d(31))
    }

    #[test]
    fn success_report_has_counts_and_total_timing() {
        let mut a = assembler();
        a.record_universe(&["000001".into(), "000002".into()]);
        a.record_counts(2, 0, 0);
        a.record_table(10, vec!["Date".into()], "abc".into());
        let meta = a.finalize_success();
        assert!(meta.is_success());
        assert_eq!(meta.ticker_count, 2);
        assert_eq!(meta.counts.succeeded, 2);
        assert!(meta.timing_seconds.contains_key("total"));
        assert_eq!(meta.dataset_hash.as_deref(), Some("abc"));
    }

    #[test]
    fn failure_report_names_stage_and_instrument() {
        let mut a = assembler();
        a.record_table(10, vec!["Date".into()], "abc".into());
        let err = RunError {
            stage: Stage::Fetch,
            instrument: Some("000002".into()),
            kind: RunErrorKind::Provider(ProviderError::NetworkUnreachable("down".into())),
        };
        let meta = a.finalize_failure(&err);
        assert_eq!(meta.run_status, RunStatus::Failed);
        let e = meta.error.as_ref().unwrap();
        assert_eq!(e.stage, "fetch");
        assert_eq!(e.ticker.as_deref(), Some("000002"));
        assert_eq!(e.kind, "ProviderError");
        assert!(meta.rows.is_none());
        assert!(meta.dataset_hash.is_none());
    }

    #[test]
    fn serialized_keys_are_sorted_and_optional_fields_skipped() {
        let meta = assembler().finalize_success();
        let value = serde_json::to_value(&meta).unwrap();
        let obj = value.as_object().unwrap();
        let keys: Vec<&String> = obj.keys().collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert!(!obj.contains_key("error"));
        assert_eq!(obj["run_status"], "success");
        assert_eq!(obj["indicators"]["mansfield_rs"]["sma_window"], 200);
    }

    #[test]
    fn universe_benchmark_records_method() {
        let m = IndustryBenchmarkMeta::new(IndustryBenchmark::Universe, "069500");
        assert_eq!(m.method.as_deref(), Some(UNIVERSE_BENCHMARK_METHOD));
        let m = IndustryBenchmarkMeta::new(IndustryBenchmark::Instrument, "069500");
        assert_eq!(m.ticker.as_deref(), Some("069500"));
    }
}
