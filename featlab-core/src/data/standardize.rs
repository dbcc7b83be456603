//! Standardizer: provider-shaped frames into canonical instrument series.
//!
//! Steps: rename recognised headers, require the OHLCV columns, coerce
//! numerics (best effort, invalid values become null), normalize dates to
//! zone-free calendar dates, drop rows without a date or close, sort
//! ascending and keep the last raw occurrence of each date.

use super::provider::RawSeries;
use super::schema::{
    SchemaError, SeriesSchema, CHANGE, CLOSE, DATE, HIGH, LOW, OPEN, TRADING_VALUE, VOLUME,
};
use crate::domain::{normalize_code, DailyBar, InstrumentSeries};
use chrono::NaiveDate;
use polars::prelude::*;

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y%m%d", "%Y/%m/%d", "%Y.%m.%d"];

/// Standardizer for raw provider series.
pub struct Standardizer;

impl Standardizer {
    /// Standardize one raw series. Pure: the input frame is not modified.
    pub fn standardize(raw: &RawSeries, instrument_id: &str) -> Result<InstrumentSeries, SchemaError> {
        let instrument_id = normalize_code(instrument_id);
        if raw.height() == 0 {
            return Err(SchemaError::EmptyInput(instrument_id));
        }

        let df = SeriesSchema::rename_to_canonical(raw)?;
        SeriesSchema::validate(&df)?;

        let dates = date_values(column(&df, DATE)?)?;
        let opens = integral_values(column(&df, OPEN)?)?;
        let highs = integral_values(column(&df, HIGH)?)?;
        let lows = integral_values(column(&df, LOW)?)?;
        let closes = integral_values(column(&df, CLOSE)?)?;
        let volumes = integral_values(column(&df, VOLUME)?)?;
        let n = df.height();
        let trading_values = match df.column(TRADING_VALUE) {
            Ok(c) => integral_values(c)?,
            Err(_) => vec![None; n],
        };
        let changes = match df.column(CHANGE) {
            Ok(c) => float_values(c)?,
            Err(_) => vec![None; n],
        };

        let mut bars: Vec<DailyBar> = (0..n)
            .filter_map(|i| {
                let date = dates[i]?;
                let close = closes[i]?;
                Some(DailyBar {
                    date,
                    open: opens[i],
                    high: highs[i],
                    low: lows[i],
                    close,
                    volume: volumes[i],
                    trading_value: trading_values[i],
                    change: changes[i],
                })
            })
            .collect();

        // Stable sort: rows sharing a date stay in raw order, so the last one
        // seen below is the last one the feed wrote.
        bars.sort_by_key(|b| b.date);
        let bars = keep_last_per_date(bars);

        if bars.is_empty() {
            return Err(SchemaError::NoValidRows(instrument_id));
        }

        let insane = bars.iter().filter(|b| !b.is_sane()).count();
        if insane > 0 {
            tracing::warn!(
                instrument = %instrument_id,
                bars = insane,
                "inconsistent OHLC values kept as reported"
            );
        }

        Ok(InstrumentSeries::new(instrument_id, bars))
    }
}

/// Collapse runs of equal dates (input sorted by date) to their last element.
fn keep_last_per_date(bars: Vec<DailyBar>) -> Vec<DailyBar> {
    let mut out: Vec<DailyBar> = Vec::with_capacity(bars.len());
    for bar in bars {
        match out.last_mut() {
            Some(last) if last.date == bar.date => *last = bar,
            _ => out.push(bar),
        }
    }
    out
}

fn column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Column, SchemaError> {
    df.column(name)
        .map_err(|_| SchemaError::MissingColumns(vec![name.to_string()]))
}

fn not_coercible(col: &Column, expected: &'static str, e: impl ToString) -> SchemaError {
    SchemaError::NotCoercible {
        column: col.name().to_string(),
        expected,
        reason: e.to_string(),
    }
}

/// Best-effort float conversion. Text is parsed after stripping thousands
/// separators; anything unparseable or non-finite becomes null.
fn float_values(col: &Column) -> Result<Vec<Option<f64>>, SchemaError> {
    if col.dtype() == &DataType::String {
        let ca = col.str().map_err(|e| not_coercible(col, "number", e))?;
        return Ok(ca
            .into_iter()
            .map(|v| {
                v.and_then(|s| s.trim().replace(',', "").parse::<f64>().ok())
                    .filter(|x| x.is_finite())
            })
            .collect());
    }
    let cast = col
        .cast(&DataType::Float64)
        .map_err(|e| not_coercible(col, "number", e))?;
    let ca = cast.f64().map_err(|e| not_coercible(col, "number", e))?;
    Ok(ca.into_iter().map(|v| v.filter(|x| x.is_finite())).collect())
}

/// Float conversion followed by rounding to whole currency units.
fn integral_values(col: &Column) -> Result<Vec<Option<i64>>, SchemaError> {
    Ok(float_values(col)?
        .into_iter()
        .map(|v| v.filter(|x| x.abs() < i64::MAX as f64).map(|x| x.round() as i64))
        .collect())
}

/// Calendar dates from a typed date, datetime, integer or text column.
///
/// Datetimes keep their local calendar date (zone and time are dropped).
/// Nulls stay null; any other unparseable value is a schema error.
pub(crate) fn date_values(col: &Column) -> Result<Vec<Option<NaiveDate>>, SchemaError> {
    match col.dtype() {
        DataType::Date => {
            let ca = col.date().map_err(|e| not_coercible(col, "date", e))?;
            let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
            Ok((0..ca.len())
                .map(|i| ca.get(i).map(|days| epoch + chrono::Duration::days(days as i64)))
                .collect())
        }
        DataType::String => parse_text_dates(col),
        DataType::Datetime(_, _) => {
            let text = col
                .cast(&DataType::String)
                .map_err(|e| not_coercible(col, "date", e))?;
            parse_text_dates(&text)
        }
        dtype if dtype.is_integer() => {
            let cast = col
                .cast(&DataType::Int64)
                .map_err(|e| not_coercible(col, "date", e))?;
            let ca = cast.i64().map_err(|e| not_coercible(col, "date", e))?;
            ca.into_iter()
                .enumerate()
                .map(|(row, v)| match v {
                    None => Ok(None),
                    Some(n) => parse_date_text(&n.to_string())
                        .map(Some)
                        .ok_or_else(|| SchemaError::InvalidDate {
                            row,
                            value: n.to_string(),
                        }),
                })
                .collect()
        }
        other => Err(not_coercible(col, "date", format!("unsupported dtype {other}"))),
    }
}

fn parse_text_dates(col: &Column) -> Result<Vec<Option<NaiveDate>>, SchemaError> {
    let ca = col.str().map_err(|e| not_coercible(col, "date", e))?;
    ca.into_iter()
        .enumerate()
        .map(|(row, v)| match v.map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => parse_date_text(s)
                .map(Some)
                .ok_or_else(|| SchemaError::InvalidDate {
                    row,
                    value: s.to_string(),
                }),
        })
        .collect()
}

/// Parse the calendar-date prefix of a date or datetime string.
fn parse_date_text(s: &str) -> Option<NaiveDate> {
    let day_part = s.split(['T', ' ']).next().unwrap_or(s);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(day_part, fmt).ok())
}
