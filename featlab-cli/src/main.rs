//! FeatLab CLI: build and validate the feature cache.
//!
//! Commands:
//! - `build`: run the pipeline against local files and write the artifacts
//!   (failure metadata on error)
//! - `validate`: release checks on an existing cache directory

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use featlab_core::data::LocalFileProvider;
use featlab_runner::{
    export_failure, export_run, validate_artifacts, FetchOrchestrator, RunConfig,
    ValidationOptions,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "featlab",
    about = "FeatLab CLI: universe feature cache builder"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every instrument, compute features and write the cache.
    Build {
        /// Path to a TOML run config. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Start date (YYYY-MM-DD). Defaults to 36 months before the end.
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        end: Option<String>,

        /// Worker pool size.
        #[arg(long)]
        workers: Option<usize>,

        /// Process only the first N instruments (0 = all).
        #[arg(long)]
        test_limit: Option<usize>,

        /// Output directory for artifacts.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Check produced artifacts before release.
    Validate {
        /// Path to a TOML run config naming the artifact files.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Cache directory, overriding the config.
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Minimum number of distinct instruments in the feature table.
        #[arg(long, default_value_t = 1)]
        min_tickers: usize,

        /// Fail when the industry table is missing.
        #[arg(long, default_value_t = false)]
        require_industry: bool,

        /// Skip the instrument master check.
        #[arg(long, default_value_t = false)]
        skip_master: bool,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            config,
            start,
            end,
            workers,
            test_limit,
            output_dir,
        } => run_build(config, start, end, workers, test_limit, output_dir),
        Commands::Validate {
            config,
            cache_dir,
            min_tickers,
            require_industry,
            skip_master,
        } => run_validate(config, cache_dir, min_tickers, require_industry, skip_master),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<RunConfig> {
    match path {
        Some(path) => RunConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(RunConfig::default()),
    }
}

fn parse_date(flag: &str, value: Option<&str>) -> Result<Option<NaiveDate>> {
    value
        .map(|s| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .with_context(|| format!("--{flag} must be YYYY-MM-DD, got {s:?}"))
        })
        .transpose()
}

fn run_build(
    config_path: Option<PathBuf>,
    start: Option<String>,
    end: Option<String>,
    workers: Option<usize>,
    test_limit: Option<usize>,
    output_dir: Option<PathBuf>,
) -> Result<ExitCode> {
    let mut config = load_config(config_path.as_ref())?;
    if let Some(start) = parse_date("start", start.as_deref())? {
        config.start_date = Some(start);
    }
    if let Some(end) = parse_date("end", end.as_deref())? {
        config.end_date = Some(end);
    }
    if let Some(workers) = workers {
        config.max_workers = workers;
    }
    if let Some(limit) = test_limit {
        config.test_limit = limit;
    }
    if let Some(dir) = output_dir {
        config.output.dir = dir;
    }
    config.logging.init();

    tracing::info!(
        config = ?config_path,
        workers = config.max_workers,
        test_limit = config.test_limit,
        "starting build"
    );

    let provider = Arc::new(LocalFileProvider::new(
        config.provider.master_path.clone(),
        config.provider.series_dir.clone(),
    ));
    let output_config = config.output.clone();
    let orchestrator = FetchOrchestrator::new(provider, config);

    match orchestrator.run() {
        Ok(mut output) => {
            export_run(&mut output, &output_config).context("failed to write artifacts")?;
            println!(
                "Built {} rows for {} instruments into {}",
                output.features.len(),
                output.metadata.ticker_count,
                output_config.dir.display()
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) => {
            export_failure(&failure, &output_config)
                .context("failed to write failure metadata")?;
            eprintln!("Build failed: {}", failure.error);
            eprintln!(
                "Failure metadata written to {}",
                output_config.metadata_path().display()
            );
            Ok(ExitCode::FAILURE)
        }
    }
}

fn run_validate(
    config_path: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    min_tickers: usize,
    require_industry: bool,
    skip_master: bool,
) -> Result<ExitCode> {
    let config = load_config(config_path.as_ref())?;
    config.logging.init();

    let mut output = config.output;
    if let Some(dir) = cache_dir {
        output.dir = dir;
    }
    let options = ValidationOptions {
        min_tickers,
        require_industry,
        check_master: !skip_master,
    };

    let report = validate_artifacts(&output, &options);
    for section in &report.sections {
        match &section.result {
            Ok(summary) => println!("ok   {:<9} {summary}", section.section),
            Err(e) => println!("FAIL {:<9} {e}", section.section),
        }
    }

    if report.is_ok() {
        println!("All validations passed");
        Ok(ExitCode::SUCCESS)
    } else {
        for (section, error) in report.errors() {
            eprintln!("{section} validation failed: {error}");
        }
        Ok(ExitCode::FAILURE)
    }
}
