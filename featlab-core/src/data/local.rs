//! Local-file provider: a master JSON snapshot plus one CSV per instrument.
//!
//! Layout:
//!
//! ```text
//! <master.json>
//! <series_dir>/<code>.csv
//! ```
//!
//! CSV headers may use any naming the standardizer recognises. Files are
//! served as stored, so the `adjusted` flag has no effect here.

use super::master::load_master_json;
use super::provider::{DataProvider, ProviderError, RawSeries, Universe};
use super::schema::{SeriesSchema, DATE};
use super::standardize::date_values;
use crate::domain::{normalize_code, InstrumentMaster};
use chrono::NaiveDate;
use polars::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct LocalFileProvider {
    master_path: PathBuf,
    series_dir: PathBuf,
}

impl LocalFileProvider {
    pub fn new(master_path: impl Into<PathBuf>, series_dir: impl Into<PathBuf>) -> Self {
        Self {
            master_path: master_path.into(),
            series_dir: series_dir.into(),
        }
    }

    pub fn series_path(&self, instrument_id: &str) -> PathBuf {
        self.series_dir
            .join(format!("{}.csv", normalize_code(instrument_id)))
    }

    fn read_csv(path: &Path) -> Result<DataFrame, ProviderError> {
        LazyCsvReader::new(path)
            .with_has_header(true)
            .with_try_parse_dates(true)
            .finish()
            .and_then(|lf| lf.collect())
            .map_err(|e| ProviderError::ResponseFormatChanged(format!("{}: {e}", path.display())))
    }
}

/// Keep rows whose date lies in `[start, end]`.
///
/// Rows whose date cannot be read are kept so that the standardizer reports
/// them; a frame without a recognisable date column is returned unchanged.
fn filter_date_range(
    df: DataFrame,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<DataFrame, ProviderError> {
    let date_header = df
        .get_column_names()
        .into_iter()
        .find(|name| SeriesSchema::canonical_name(name.as_str()) == Some(DATE))
        .map(|name| name.to_string());
    let Some(date_header) = date_header else {
        return Ok(df);
    };
    let dates = match df.column(&date_header).map(date_values) {
        Ok(Ok(dates)) => dates,
        _ => return Ok(df),
    };
    let keep: Vec<bool> = dates
        .iter()
        .map(|d| d.map_or(true, |d| d >= start && d <= end))
        .collect();
    let mask = BooleanChunked::new("in_range".into(), keep);
    df.filter(&mask)
        .map_err(|e| ProviderError::Other(e.to_string()))
}

impl DataProvider for LocalFileProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn list_instruments(
        &self,
        _as_of: Option<NaiveDate>,
        market: Option<&str>,
    ) -> Result<Universe, ProviderError> {
        let master = self.load_instrument_master(None)?;
        let mut seen = HashSet::new();
        let mut universe = Universe::default();
        for row in master
            .iter()
            .filter(|m| market.map_or(true, |mk| m.market.eq_ignore_ascii_case(mk.trim())))
        {
            if seen.insert(row.code.clone()) {
                universe.instrument_ids.push(row.code.clone());
                universe
                    .market_by_instrument
                    .insert(row.code.clone(), row.market.clone());
            }
        }
        Ok(universe)
    }

    fn load_instrument_master(
        &self,
        _as_of: Option<NaiveDate>,
    ) -> Result<Vec<InstrumentMaster>, ProviderError> {
        if !self.master_path.exists() {
            return Err(ProviderError::MasterUnavailable(format!(
                "{} not found",
                self.master_path.display()
            )));
        }
        load_master_json(&self.master_path)
    }

    fn fetch_series(
        &self,
        instrument_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        _adjusted: bool,
    ) -> Result<RawSeries, ProviderError> {
        let path = self.series_path(instrument_id);
        if !path.exists() {
            return Err(ProviderError::InstrumentNotFound {
                instrument_id: instrument_id.to_string(),
            });
        }
        let df = Self::read_csv(&path)?;
        filter_date_range(df, start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn fixture() -> (tempfile::TempDir, LocalFileProvider) {
        let dir = tempfile::tempdir().unwrap();
        let master = dir.path().join("master.json");
        fs::write(
            &master,
            r#"[
                {"Code": "005930", "Name": "A", "Market": "KOSPI", "IndustryLarge": "IT"},
                {"Code": "035720", "Name": "B", "Market": "KOSDAQ", "IndustryLarge": "IT"},
                {"Code": "069500", "Name": "F", "Market": "ETF"}
            ]"#,
        )
        .unwrap();
        let series = dir.path().join("series");
        fs::create_dir(&series).unwrap();
        fs::write(
            series.join("005930.csv"),
            "Date,Open,High,Low,Close,Volume\n\
             2024-01-02,10,11,9,10,100\n\
             2024-01-03,10,12,9,11,100\n\
             2024-01-04,11,12,10,12,100\n",
        )
        .unwrap();
        let provider = LocalFileProvider::new(master, series);
        (dir, provider)
    }

    #[test]
    fn lists_universe_with_market_filter() {
        let (_dir, p) = fixture();
        let all = p.list_instruments(None, None).unwrap();
        assert_eq!(all.len(), 3);
        let kospi = p.list_instruments(None, Some("kospi")).unwrap();
        assert_eq!(kospi.instrument_ids, vec!["005930".to_string()]);
        assert_eq!(kospi.market_by_instrument["005930"], "KOSPI");
    }

    #[test]
    fn fetch_applies_date_range() {
        let (_dir, p) = fixture();
        let df = p
            .fetch_series("5930", d(2024, 1, 3), d(2024, 1, 31), false)
            .unwrap();
        assert_eq!(df.height(), 2);
    }

    #[test]
    fn missing_series_file_is_not_found() {
        let (_dir, p) = fixture();
        let err = p
            .fetch_series("035720", d(2024, 1, 1), d(2024, 12, 31), false)
            .unwrap_err();
        assert!(matches!(err, ProviderError::InstrumentNotFound { .. }));
    }

    #[test]
    fn missing_master_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let p = LocalFileProvider::new(dir.path().join("nope.json"), dir.path());
        assert!(matches!(
            p.load_instrument_master(None),
            Err(ProviderError::MasterUnavailable(_))
        ));
    }
}
