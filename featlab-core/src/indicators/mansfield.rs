//! Mansfield relative strength against a benchmark.
//!
//! `RS(t) = (ratio(t) / SMA_w(ratio)(t) - 1) * 100`, where
//! `ratio(t) = close(t) / benchmark_close(t)` is aligned by date. A missing
//! or zero benchmark close makes the ratio, and any window containing it,
//! undefined.

use super::rolling::rolling_mean;
use crate::domain::InstrumentSeries;
use chrono::NaiveDate;
use std::collections::HashMap;

/// Benchmark closes keyed by calendar date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BenchmarkCloses {
    by_date: HashMap<NaiveDate, f64>,
}

impl BenchmarkCloses {
    /// Build from `(date, close)` pairs; a repeated date keeps the last value.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (NaiveDate, f64)>) -> Self {
        let mut by_date = HashMap::new();
        for (date, close) in pairs {
            by_date.insert(date, close);
        }
        Self { by_date }
    }

    pub fn from_series(series: &InstrumentSeries) -> Self {
        Self::from_pairs(series.bars.iter().map(|b| (b.date, b.close_f64())))
    }

    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.by_date.get(&date).copied()
    }

    pub fn len(&self) -> usize {
        self.by_date.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_date.is_empty()
    }

    /// `close / benchmark` for each date; undefined where either side is
    /// missing or the quotient is not finite.
    pub fn ratios(&self, dates: &[NaiveDate], closes: &[Option<f64>]) -> Vec<Option<f64>> {
        dates
            .iter()
            .zip(closes)
            .map(|(date, close)| {
                let close = (*close)?;
                let bench = self.get(*date)?;
                Some(close / bench).filter(|r| r.is_finite())
            })
            .collect()
    }
}

/// Mansfield RS from an aligned ratio series.
pub fn mansfield_from_ratios(ratios: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    rolling_mean(ratios, window)
        .into_iter()
        .zip(ratios)
        .map(|(sma, ratio)| match (ratio, sma) {
            (Some(r), Some(s)) if s != 0.0 => Some((r / s - 1.0) * 100.0),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    fn dates(n: usize) -> Vec<NaiveDate> {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..n).map(|i| base + chrono::Duration::days(i as i64)).collect()
    }

    #[test]
    fn later_duplicate_wins() {
        let d = dates(1)[0];
        let b = BenchmarkCloses::from_pairs([(d, 1.0), (d, 2.0)]);
        assert_eq!(b.get(d), Some(2.0));
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn constant_ratio_gives_zero_rs() {
        let ds = dates(5);
        let bench = BenchmarkCloses::from_pairs(ds.iter().map(|&d| (d, 50.0)));
        let closes: Vec<Option<f64>> = vec![Some(100.0); 5];
        let rs = mansfield_from_ratios(&bench.ratios(&ds, &closes), 3);
        assert_eq!(rs[1], None);
        assert_approx(rs[2].unwrap(), 0.0, DEFAULT_EPSILON);
        assert_approx(rs[4].unwrap(), 0.0, DEFAULT_EPSILON);
    }

    #[test]
    fn missing_benchmark_date_breaks_windows() {
        let ds = dates(4);
        let bench = BenchmarkCloses::from_pairs([(ds[0], 1.0), (ds[2], 1.0), (ds[3], 1.0)]);
        let closes: Vec<Option<f64>> = vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)];
        let ratios = bench.ratios(&ds, &closes);
        assert_eq!(ratios[1], None);
        let rs = mansfield_from_ratios(&ratios, 2);
        assert_eq!(rs[1], None);
        assert_eq!(rs[2], None);
        // ratio 4 over mean(3, 4)
        assert_approx(rs[3].unwrap(), (4.0 / 3.5 - 1.0) * 100.0, DEFAULT_EPSILON);
    }

    #[test]
    fn zero_benchmark_close_is_undefined() {
        let ds = dates(1);
        let bench = BenchmarkCloses::from_pairs([(ds[0], 0.0)]);
        assert_eq!(bench.ratios(&ds, &[Some(10.0)]), vec![None]);
    }
}
