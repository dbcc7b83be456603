//! FetchOrchestrator: drives fetch → standardize → features across the
//! universe under a bounded worker pool, fail-fast.
//!
//! Universe, master and benchmark are acquired once on the coordinating
//! thread and shared read-only with every task. Tasks run on a private rayon
//! pool and report exactly one message each over an mpsc channel; only the
//! coordinator mutates run metadata. The first failure sets a shared cancel
//! flag (tasks check it before each acquisition and before computing) and the
//! coordinator waits at most the configured grace period for in-flight tasks.

use chrono::NaiveDate;
use featlab_core::data::{DataProvider, FetchProgress, ProviderError, SchemaError, Standardizer};
use featlab_core::domain::{
    normalize_code, DataShapeError, IndustryFeatureRecord, IndustryLevel, InstrumentFeatures,
    InstrumentMaster,
};
use featlab_core::indicators::{BenchmarkCloses, IndicatorEngine};
use featlab_core::industry::{AggregationError, IndustryAggregator, UNIVERSE_BENCHMARK_METHOD};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::config::{RunConfig, RunConfigError};
use crate::metadata::{
    BenchmarkMeta, BenchmarkStatus, IndustryBenchmarkMeta, IndustryMeta, MetadataAssembler,
    RunMetadata,
};
use crate::progress::LogProgress;
use crate::table::FeatureTable;

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Config,
    Universe,
    Master,
    Benchmark,
    Fetch,
    Standardize,
    Features,
    Aggregate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Config => "config",
            Stage::Universe => "universe",
            Stage::Master => "master",
            Stage::Benchmark => "benchmark",
            Stage::Fetch => "fetch",
            Stage::Standardize => "standardize",
            Stage::Features => "features",
            Stage::Aggregate => "aggregate",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum RunErrorKind {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    DataShape(#[from] DataShapeError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error(transparent)]
    Config(#[from] RunConfigError),

    #[error("provider returned an empty universe")]
    EmptyUniverse,

    #[error("worker pool unavailable: {0}")]
    Pool(String),

    #[error("{0} worker task(s) ended without reporting a result")]
    LostTasks(usize),
}

impl RunErrorKind {
    /// Error category recorded in failure metadata.
    pub fn type_name(&self) -> &'static str {
        match self {
            RunErrorKind::Provider(_) => "ProviderError",
            RunErrorKind::Schema(_) => "SchemaError",
            RunErrorKind::DataShape(_) => "DataShapeError",
            RunErrorKind::Aggregation(_) => "AggregationError",
            RunErrorKind::Config(_) => "ConfigError",
            RunErrorKind::EmptyUniverse => "EmptyUniverse",
            RunErrorKind::Pool(_) | RunErrorKind::LostTasks(_) => "WorkerError",
        }
    }
}

fn instrument_suffix(instrument: &Option<String>) -> String {
    instrument
        .as_deref()
        .map(|id| format!(" for {id}"))
        .unwrap_or_default()
}

/// A fatal run error with the stage and instrument it is attributed to.
#[derive(Debug, Error)]
#[error("{stage} failed{}: {kind}", instrument_suffix(.instrument))]
pub struct RunError {
    pub stage: Stage,
    pub instrument: Option<String>,
    #[source]
    pub kind: RunErrorKind,
}

impl RunError {
    pub fn new(stage: Stage, kind: impl Into<RunErrorKind>) -> Self {
        Self {
            stage,
            instrument: None,
            kind: kind.into(),
        }
    }

    pub fn for_instrument(stage: Stage, instrument: &str, kind: impl Into<RunErrorKind>) -> Self {
        Self {
            stage,
            instrument: Some(instrument.to_string()),
            kind: kind.into(),
        }
    }
}

/// Everything a successful run produced.
#[derive(Debug)]
pub struct RunOutput {
    pub features: FeatureTable,
    pub industry: Vec<IndustryFeatureRecord>,
    pub master: Vec<InstrumentMaster>,
    pub metadata: RunMetadata,
}

/// A failed run: the error and the finalized failure report.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RunFailure {
    pub error: RunError,
    pub metadata: RunMetadata,
}

enum TaskOutcome {
    Done(InstrumentFeatures),
    Failed(Stage, RunErrorKind),
    /// Cancellation observed before the task did any work worth reporting.
    Skipped,
}

struct TaskReport {
    index: usize,
    instrument_id: String,
    outcome: TaskOutcome,
}

/// Read-only state shared by every task of a run.
struct TaskContext {
    provider: Arc<dyn DataProvider>,
    engine: IndicatorEngine,
    benchmark: Option<BenchmarkCloses>,
    start: NaiveDate,
    end: NaiveDate,
    adjusted: bool,
}

impl TaskContext {
    fn process(&self, instrument_id: &str, cancel: &AtomicBool) -> TaskOutcome {
        if cancel.load(Ordering::Relaxed) {
            return TaskOutcome::Skipped;
        }
        let raw = match self
            .provider
            .fetch_series(instrument_id, self.start, self.end, self.adjusted)
        {
            Ok(raw) => raw,
            Err(e) => return TaskOutcome::Failed(Stage::Fetch, e.into()),
        };
        if cancel.load(Ordering::Relaxed) {
            return TaskOutcome::Skipped;
        }
        let series = match Standardizer::standardize(&raw, instrument_id) {
            Ok(series) => series,
            Err(e) => return TaskOutcome::Failed(Stage::Standardize, e.into()),
        };
        match self.engine.compute_features(&series, self.benchmark.as_ref()) {
            Ok(features) => TaskOutcome::Done(features),
            Err(e) => TaskOutcome::Failed(Stage::Features, e.into()),
        }
    }
}

/// Tally of a fan-out, kept by the coordinator.
#[derive(Debug, Default)]
struct FanOutTally {
    succeeded: usize,
    failed: usize,
    skipped: usize,
}

pub struct FetchOrchestrator {
    provider: Arc<dyn DataProvider>,
    config: RunConfig,
    progress: Arc<dyn FetchProgress>,
}

impl FetchOrchestrator {
    pub fn new(provider: Arc<dyn DataProvider>, config: RunConfig) -> Self {
        Self {
            provider,
            config,
            progress: Arc::new(LogProgress::default()),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn FetchProgress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run with the date range resolved against today's UTC date.
    pub fn run(&self) -> Result<RunOutput, RunFailure> {
        self.run_as_of(chrono::Utc::now().date_naive())
    }

    /// Run the whole pipeline. Either every instrument succeeds and the
    /// output is complete, or the run fails with a finalized failure report.
    pub fn run_as_of(&self, today: NaiveDate) -> Result<RunOutput, RunFailure> {
        let (start, end) = match self.config.date_range(today) {
            Ok(range) => range,
            Err(e) => {
                // Report the dates we were given; there is no valid range.
                let end = self.config.end_date.unwrap_or(today);
                let start = self.config.start_date.unwrap_or(end);
                let assembler = MetadataAssembler::start(&self.config, self.provider.name(), start, end);
                let error = RunError::new(Stage::Config, e);
                let metadata = assembler.finalize_failure(&error);
                return Err(RunFailure { error, metadata });
            }
        };

        let mut assembler = MetadataAssembler::start(&self.config, self.provider.name(), start, end);
        match self.execute(&mut assembler, start, end) {
            Ok((features, industry, master)) => Ok(RunOutput {
                features,
                industry,
                master,
                metadata: assembler.finalize_success(),
            }),
            Err(error) => {
                tracing::error!(
                    stage = %error.stage,
                    instrument = error.instrument.as_deref().unwrap_or("-"),
                    error = %error.kind,
                    "run failed"
                );
                let metadata = assembler.finalize_failure(&error);
                Err(RunFailure { error, metadata })
            }
        }
    }

    fn execute(
        &self,
        assembler: &mut MetadataAssembler,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<(FeatureTable, Vec<IndustryFeatureRecord>, Vec<InstrumentMaster>), RunError> {
        let config = &self.config;
        config
            .validate()
            .map_err(|e| RunError::new(Stage::Config, e))?;
        let engine = IndicatorEngine::new(config.features.clone())
            .map_err(|e| RunError::new(Stage::Config, RunConfigError::from(e)))?;

        // 1) Universe + master, once.
        let t = Instant::now();
        let universe = self
            .provider
            .list_instruments(config.as_of, config.market.as_deref())
            .map_err(|e| RunError::new(Stage::Universe, e))?;
        // Providers may list unpadded or repeated codes; ids are canonical
        // from here on.
        let mut instrument_ids: Vec<String> = universe
            .instrument_ids
            .iter()
            .map(|id| normalize_code(id))
            .filter(|id| !id.is_empty())
            .collect();
        instrument_ids.sort();
        instrument_ids.dedup();
        if config.test_limit > 0 {
            instrument_ids.truncate(config.test_limit);
        }
        if instrument_ids.is_empty() {
            return Err(RunError::new(Stage::Universe, RunErrorKind::EmptyUniverse));
        }
        let master = self
            .provider
            .load_instrument_master(config.as_of)
            .map_err(|e| RunError::new(Stage::Master, e))?;
        assembler.record_universe(&instrument_ids);
        assembler.record_timing("universe_and_master", t.elapsed());
        tracing::info!(
            instruments = instrument_ids.len(),
            master_rows = master.len(),
            elapsed_s = t.elapsed().as_secs_f64(),
            "universe and master loaded"
        );

        // 2) Benchmark, once. Unavailable degrades relative strength to null.
        let t = Instant::now();
        let benchmark = self.load_benchmark(start, end, assembler);
        assembler.record_timing("benchmark_fetch", t.elapsed());

        // 3) Fan-out.
        let t = Instant::now();
        let context = Arc::new(TaskContext {
            provider: Arc::clone(&self.provider),
            engine,
            benchmark,
            start,
            end,
            adjusted: config.adjusted,
        });
        let collected = if config.max_workers == 1 {
            self.run_sequential(&context, &instrument_ids, assembler)?
        } else {
            self.run_parallel(&context, &instrument_ids, assembler)?
        };
        assembler.record_timing("data_fetch_and_features", t.elapsed());
        tracing::info!(
            instruments = collected.len(),
            elapsed_s = t.elapsed().as_secs_f64(),
            "per-instrument features computed"
        );

        // 4) Concatenate in instrument order and rank.
        let t = Instant::now();
        let table = FeatureTable::assemble(config.features.clone(), &collected);
        assembler.record_table(table.len(), table.columns(), table.content_hash());
        assembler.record_timing("concat_and_ranks", t.elapsed());

        // 5) Industry levels.
        let mut industry = Vec::new();
        if !config.levels.is_empty() {
            let t = Instant::now();
            let aggregator = IndustryAggregator::new(config.features.clone());
            industry = aggregator
                .build_levels(
                    &collected,
                    &master,
                    &config.levels,
                    config.industry_benchmark,
                    context.benchmark.as_ref(),
                )
                .map_err(|e| RunError::new(Stage::Aggregate, e))?;
            let keys: BTreeSet<(IndustryLevel, &str)> = industry
                .iter()
                .map(|r| (r.level, r.industry_key.as_str()))
                .collect();
            assembler.record_industry(IndustryMeta {
                levels: config.levels.clone(),
                index_method: UNIVERSE_BENCHMARK_METHOD.into(),
                benchmark: IndustryBenchmarkMeta::new(config.industry_benchmark, &config.benchmark_id),
                sma_window: config.features.rs_window,
                rows: industry.len(),
                industries: keys.len(),
            });
            assembler.record_timing("industry_features", t.elapsed());
            tracing::info!(rows = industry.len(), industries = keys.len(), "industry features computed");
        }

        Ok((table, industry, master))
    }

    fn load_benchmark(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        assembler: &mut MetadataAssembler,
    ) -> Option<BenchmarkCloses> {
        let id = self.config.benchmark_id.as_str();
        let loaded = self
            .provider
            .fetch_series(id, start, end, self.config.adjusted)
            .map_err(|e| e.to_string())
            .and_then(|raw| Standardizer::standardize(&raw, id).map_err(|e| e.to_string()))
            .map(|series| BenchmarkCloses::from_series(&series))
            .and_then(|closes| {
                if closes.is_empty() {
                    Err("benchmark series is empty".to_string())
                } else {
                    Ok(closes)
                }
            });

        match loaded {
            Ok(closes) => {
                assembler.record_benchmark(BenchmarkMeta {
                    ticker: id.to_string(),
                    status: BenchmarkStatus::Available,
                    rows: Some(closes.len()),
                    reason: None,
                });
                Some(closes)
            }
            Err(reason) => {
                let err = AggregationError::BenchmarkUnavailable(reason.clone());
                tracing::warn!(benchmark = id, error = %err, "relative strength will be null");
                assembler.record_benchmark(BenchmarkMeta {
                    ticker: id.to_string(),
                    status: BenchmarkStatus::Unavailable,
                    rows: None,
                    reason: Some(reason),
                });
                None
            }
        }
    }

    /// Pool size 1: every instrument inline, in order, stopping at the first
    /// failure.
    fn run_sequential(
        &self,
        context: &TaskContext,
        instrument_ids: &[String],
        assembler: &mut MetadataAssembler,
    ) -> Result<Vec<InstrumentFeatures>, RunError> {
        let total = instrument_ids.len();
        let never = AtomicBool::new(false);
        let mut collected = Vec::with_capacity(total);
        tracing::info!(total, "processing instruments sequentially");

        for (index, id) in instrument_ids.iter().enumerate() {
            self.progress.on_start(id, index, total);
            match context.process(id, &never) {
                TaskOutcome::Done(features) => {
                    self.progress.on_complete(id, index + 1, total, true);
                    collected.push(features);
                }
                TaskOutcome::Failed(stage, kind) => {
                    self.progress.on_complete(id, index + 1, total, false);
                    assembler.record_counts(collected.len(), 1, 0);
                    return Err(RunError::for_instrument(stage, id, kind));
                }
                TaskOutcome::Skipped => {}
            }
        }

        assembler.record_counts(collected.len(), 0, 0);
        self.progress.on_batch_complete(collected.len(), 0, total);
        Ok(collected)
    }

    fn run_parallel(
        &self,
        context: &Arc<TaskContext>,
        instrument_ids: &[String],
        assembler: &mut MetadataAssembler,
    ) -> Result<Vec<InstrumentFeatures>, RunError> {
        let total = instrument_ids.len();
        let workers = self.config.max_workers.min(total).max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("featlab-fetch-{i}"))
            .panic_handler(|_| tracing::error!("worker task panicked"))
            .build()
            .map_err(|e| RunError::new(Stage::Fetch, RunErrorKind::Pool(e.to_string())))?;
        tracing::info!(total, workers, "processing instruments in parallel");

        let cancel = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel::<TaskReport>();

        for (index, id) in instrument_ids.iter().enumerate() {
            let tx = tx.clone();
            let context = Arc::clone(context);
            let cancel = Arc::clone(&cancel);
            let progress = Arc::clone(&self.progress);
            let instrument_id = id.clone();
            pool.spawn(move || {
                if !cancel.load(Ordering::Relaxed) {
                    progress.on_start(&instrument_id, index, total);
                }
                let outcome = context.process(&instrument_id, &cancel);
                // The coordinator may have stopped listening; nothing to do then.
                let _ = tx.send(TaskReport {
                    index,
                    instrument_id,
                    outcome,
                });
            });
        }
        drop(tx);

        let grace = self.config.cancel_grace();
        let mut slots: Vec<Option<InstrumentFeatures>> = (0..total).map(|_| None).collect();
        let mut tally = FanOutTally::default();
        let mut failure: Option<RunError> = None;
        let mut deadline: Option<Instant> = None;
        let mut received = 0usize;

        while received < total {
            let report = match deadline {
                None => match rx.recv() {
                    Ok(report) => report,
                    Err(_) => break,
                },
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    match rx.recv_timeout(deadline - now) {
                        Ok(report) => report,
                        Err(_) => break,
                    }
                }
            };
            received += 1;

            match report.outcome {
                TaskOutcome::Done(features) => {
                    tally.succeeded += 1;
                    self.progress
                        .on_complete(&report.instrument_id, received, total, true);
                    slots[report.index] = Some(features);
                }
                TaskOutcome::Failed(stage, kind) => {
                    tally.failed += 1;
                    self.progress
                        .on_complete(&report.instrument_id, received, total, false);
                    if failure.is_none() {
                        cancel.store(true, Ordering::Relaxed);
                        deadline = Some(Instant::now() + grace);
                        failure = Some(RunError::for_instrument(stage, &report.instrument_id, kind));
                    } else {
                        tracing::debug!(
                            instrument = %report.instrument_id,
                            stage = %stage,
                            error = %kind,
                            "further failure after cancellation"
                        );
                    }
                }
                TaskOutcome::Skipped => tally.skipped += 1,
            }
        }

        // Stop any queued task from acquiring; dropping the pool does not wait.
        cancel.store(true, Ordering::Relaxed);
        drop(pool);

        assembler.record_counts(tally.succeeded, tally.failed, tally.skipped);
        self.progress
            .on_batch_complete(tally.succeeded, tally.failed, total);

        if let Some(error) = failure {
            return Err(error);
        }
        let lost = total - received;
        if lost > 0 {
            return Err(RunError::new(Stage::Fetch, RunErrorKind::LostTasks(lost)));
        }
        Ok(slots.into_iter().flatten().collect())
    }
}
