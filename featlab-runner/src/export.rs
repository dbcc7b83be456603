//! Artifact export: the universe feature table, industry table and instrument
//! master as zstd parquet, plus the run metadata document as JSON.
//!
//! Every file is written to a sibling `.tmp` path and renamed into place, so a
//! reader never sees a half-written artifact. A failed run writes only its
//! metadata document.

use chrono::NaiveDate;
use featlab_core::config::FeatureConfig;
use featlab_core::domain::{IndustryFeatureRecord, InstrumentMaster};
use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::OutputConfig;
use crate::metadata::{DataFileMeta, RunMetadata};
use crate::orchestrator::{RunFailure, RunOutput};
use crate::table::FeatureTable;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("building {table} frame: {source}")]
    Frame {
        table: &'static str,
        #[source]
        source: PolarsError,
    },

    #[error("writing parquet {path}: {source}")]
    Parquet {
        path: PathBuf,
        #[source]
        source: PolarsError,
    },

    #[error("serializing run metadata: {0}")]
    Json(#[from] serde_json::Error),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ExportError + '_ {
    move |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn epoch_days(date: NaiveDate) -> i32 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    (date - epoch).num_days() as i32
}

fn date_column(dates: Vec<i32>) -> PolarsResult<Column> {
    Column::new("Date".into(), dates).cast(&DataType::Date)
}

fn text_column<T>(name: &str, items: &[T], f: impl Fn(&T) -> &str) -> Column {
    Column::new(name.into(), items.iter().map(f).collect::<Vec<&str>>())
}

/// The universe feature table as a frame, columns in `FeatureTable::columns`
/// order.
pub fn feature_frame(table: &FeatureTable) -> Result<DataFrame, ExportError> {
    let frame_err = |source| ExportError::Frame {
        table: "features",
        source,
    };
    let rows = &table.rows;
    let config = &table.config;

    let mut columns = vec![
        date_column(rows.iter().map(|r| epoch_days(r.record.bar.date)).collect())
            .map_err(frame_err)?,
        Column::new(
            "Ticker".into(),
            rows.iter()
                .map(|r| r.record.instrument_id.as_str())
                .collect::<Vec<_>>(),
        ),
        Column::new("Open".into(), rows.iter().map(|r| r.record.bar.open).collect::<Vec<_>>()),
        Column::new("High".into(), rows.iter().map(|r| r.record.bar.high).collect::<Vec<_>>()),
        Column::new("Low".into(), rows.iter().map(|r| r.record.bar.low).collect::<Vec<_>>()),
        Column::new("Close".into(), rows.iter().map(|r| r.record.bar.close).collect::<Vec<_>>()),
        Column::new(
            "Volume".into(),
            rows.iter().map(|r| r.record.bar.volume).collect::<Vec<_>>(),
        ),
        Column::new(
            "TradingValue".into(),
            rows.iter()
                .map(|r| r.record.bar.trading_value)
                .collect::<Vec<_>>(),
        ),
        Column::new(
            "Change".into(),
            rows.iter().map(|r| r.record.bar.change).collect::<Vec<_>>(),
        ),
    ];

    for (k, &window) in config.ma_windows.iter().enumerate() {
        columns.push(Column::new(
            FeatureConfig::ma_column(window).into(),
            rows.iter()
                .map(|r| r.record.moving_averages.get(k).copied().flatten())
                .collect::<Vec<_>>(),
        ));
    }
    for (k, &window) in config.volume_ma_windows.iter().enumerate() {
        columns.push(Column::new(
            FeatureConfig::vma_column(window).into(),
            rows.iter()
                .map(|r| r.record.volume_moving_averages.get(k).copied().flatten())
                .collect::<Vec<_>>(),
        ));
    }
    columns.push(Column::new(
        "MansfieldRS".into(),
        rows.iter().map(|r| r.record.mansfield_rs).collect::<Vec<_>>(),
    ));
    columns.push(Column::new(
        "IsNewHigh1Y".into(),
        rows.iter().map(|r| r.record.is_new_high_1y).collect::<Vec<_>>(),
    ));
    for (k, mrs) in config.mrs_windows.iter().enumerate() {
        columns.push(Column::new(
            mrs.name.as_str().into(),
            rows.iter()
                .map(|r| r.mrs_percentiles.get(k).copied().flatten())
                .collect::<Vec<_>>(),
        ));
    }

    DataFrame::new(columns).map_err(frame_err)
}

/// Industry rows as a frame. Multi-timeframe columns carry raw values and are
/// suffixed `_raw`.
pub fn industry_frame(
    rows: &[IndustryFeatureRecord],
    config: &FeatureConfig,
) -> Result<DataFrame, ExportError> {
    let frame_err = |source| ExportError::Frame {
        table: "industry",
        source,
    };
    let mut columns = vec![
        date_column(rows.iter().map(|r| epoch_days(r.date)).collect()).map_err(frame_err)?,
        text_column("Level", rows, |r| r.level.code()),
        text_column("IndustryLarge", rows, |r| r.industry_large.as_str()),
        text_column("IndustryMid", rows, |r| r.industry_mid.as_str()),
        text_column("IndustrySmall", rows, |r| r.industry_small.as_str()),
        text_column("IndustryKey", rows, |r| r.industry_key.as_str()),
        Column::new(
            "IndustryClose".into(),
            rows.iter().map(|r| r.industry_close).collect::<Vec<_>>(),
        ),
        Column::new(
            "IndustryReturn".into(),
            rows.iter().map(|r| r.industry_return).collect::<Vec<_>>(),
        ),
        Column::new(
            "ConstituentCount".into(),
            rows.iter().map(|r| r.constituent_count).collect::<Vec<_>>(),
        ),
        Column::new(
            "MansfieldRS".into(),
            rows.iter().map(|r| r.mansfield_rs).collect::<Vec<_>>(),
        ),
    ];
    for (k, mrs) in config.mrs_windows.iter().enumerate() {
        columns.push(Column::new(
            format!("{}_raw", mrs.name).into(),
            rows.iter()
                .map(|r| r.mrs_raw.get(k).copied().flatten())
                .collect::<Vec<_>>(),
        ));
    }

    DataFrame::new(columns).map_err(frame_err)
}

pub fn master_frame(master: &[InstrumentMaster]) -> Result<DataFrame, ExportError> {
    DataFrame::new(vec![
        text_column("Code", master, |m| m.code.as_str()),
        text_column("Name", master, |m| m.name.as_str()),
        text_column("Market", master, |m| m.market.as_str()),
        text_column("IndustryLarge", master, |m| m.industry_large.as_str()),
        text_column("IndustryMid", master, |m| m.industry_mid.as_str()),
        text_column("IndustrySmall", master, |m| m.industry_small.as_str()),
        Column::new(
            "SharesOutstanding".into(),
            master.iter().map(|m| m.shares_outstanding).collect::<Vec<_>>(),
        ),
    ])
    .map_err(|source| ExportError::Frame {
        table: "master",
        source,
    })
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn ensure_parent(path: &Path) -> Result<(), ExportError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(io_err(parent))
        }
        _ => Ok(()),
    }
}

/// Rename `tmp` over `path`, removing `tmp` if the rename fails.
fn publish(tmp: &Path, path: &Path) -> Result<(), ExportError> {
    if let Err(e) = fs::rename(tmp, path) {
        let _ = fs::remove_file(tmp);
        return Err(io_err(path)(e));
    }
    Ok(())
}

/// Write `df` as zstd parquet via a temporary file. Returns the file size in
/// bytes.
pub fn write_parquet_atomic(df: &mut DataFrame, path: &Path) -> Result<u64, ExportError> {
    ensure_parent(path)?;
    let tmp = tmp_path(path);
    let file = fs::File::create(&tmp).map_err(io_err(&tmp))?;
    let written = ParquetWriter::new(file)
        .with_compression(ParquetCompression::Zstd(None))
        .finish(df);
    if let Err(source) = written {
        let _ = fs::remove_file(&tmp);
        return Err(ExportError::Parquet {
            path: path.to_path_buf(),
            source,
        });
    }
    publish(&tmp, path)?;
    Ok(fs::metadata(path).map_err(io_err(path))?.len())
}

/// Metadata as pretty JSON. Keys are sorted: going through `Value` puts every
/// object into serde_json's ordered map.
pub fn metadata_json(meta: &RunMetadata) -> Result<String, ExportError> {
    let value = serde_json::to_value(meta)?;
    Ok(serde_json::to_string_pretty(&value)?)
}

pub fn write_metadata(meta: &RunMetadata, path: &Path) -> Result<(), ExportError> {
    ensure_parent(path)?;
    let json = metadata_json(meta)?;
    let tmp = tmp_path(path);
    fs::write(&tmp, json).map_err(io_err(&tmp))?;
    publish(&tmp, path)
}

fn size_mb(bytes: u64) -> f64 {
    (bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0
}

fn file_meta(path: &Path, rows: usize, bytes: u64) -> DataFileMeta {
    DataFileMeta {
        path: path.display().to_string(),
        generated: true,
        rows,
        size_mb: Some(size_mb(bytes)),
    }
}

/// Write every artifact of a successful run, recording each file in the run
/// metadata before the metadata itself is written last.
pub fn export_run(output: &mut RunOutput, config: &OutputConfig) -> Result<(), ExportError> {
    let started = std::time::Instant::now();

    let path = config.features_path();
    let mut df = feature_frame(&output.features)?;
    let bytes = write_parquet_atomic(&mut df, &path)?;
    output
        .metadata
        .record_data_file("features", file_meta(&path, df.height(), bytes));
    tracing::info!(path = %path.display(), rows = df.height(), size_mb = size_mb(bytes), "feature table written");

    if let Some(path) = config.industry_path() {
        if !output.industry.is_empty() {
            let mut df = industry_frame(&output.industry, &output.features.config)?;
            let bytes = write_parquet_atomic(&mut df, &path)?;
            output
                .metadata
                .record_data_file("industry", file_meta(&path, df.height(), bytes));
            tracing::info!(path = %path.display(), rows = df.height(), "industry table written");
        }
    }

    if let Some(path) = config.master_path() {
        let mut df = master_frame(&output.master)?;
        let bytes = write_parquet_atomic(&mut df, &path)?;
        output
            .metadata
            .record_data_file("master", file_meta(&path, df.height(), bytes));
        tracing::info!(path = %path.display(), rows = df.height(), "instrument master written");
    }

    output.metadata.record_timing("save", started.elapsed());
    let path = config.metadata_path();
    write_metadata(&output.metadata, &path)?;
    tracing::info!(path = %path.display(), "run metadata written");
    Ok(())
}

/// Write the failure document. Data artifacts are left untouched.
pub fn export_failure(failure: &RunFailure, config: &OutputConfig) -> Result<(), ExportError> {
    let path = config.metadata_path();
    write_metadata(&failure.metadata, &path)?;
    tracing::info!(path = %path.display(), "failure metadata written");
    Ok(())
}
