//! InstrumentSeries: the canonical per-instrument daily series.

use super::bar::DailyBar;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A standardized series for one instrument.
///
/// Produced by the standardizer: dates strictly increasing, one bar per date.
/// Consumers that require the invariant call [`InstrumentSeries::check_shape`]
/// rather than trusting the constructor, since series can also be built by
/// hand (tests, providers that pre-standardize).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSeries {
    pub instrument_id: String,
    pub bars: Vec<DailyBar>,
}

/// The series reaching the indicator engine violates the standardizer contract.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataShapeError {
    #[error("series for {instrument_id} is empty")]
    Empty { instrument_id: String },

    #[error("duplicate date {date} in series for {instrument_id}")]
    DuplicateDate {
        instrument_id: String,
        date: NaiveDate,
    },

    #[error("dates out of order in series for {instrument_id}: {previous} followed by {next}")]
    OutOfOrder {
        instrument_id: String,
        previous: NaiveDate,
        next: NaiveDate,
    },
}

impl InstrumentSeries {
    pub fn new(instrument_id: impl Into<String>, bars: Vec<DailyBar>) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            bars,
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.bars.iter().map(|b| b.date)
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(DailyBar::close_f64).collect()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|b| b.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    /// Verify dates are strictly increasing (which also rules out duplicates).
    pub fn check_shape(&self) -> Result<(), DataShapeError> {
        if self.bars.is_empty() {
            return Err(DataShapeError::Empty {
                instrument_id: self.instrument_id.clone(),
            });
        }
        for pair in self.bars.windows(2) {
            let (previous, next) = (pair[0].date, pair[1].date);
            if next == previous {
                return Err(DataShapeError::DuplicateDate {
                    instrument_id: self.instrument_id.clone(),
                    date: next,
                });
            }
            if next < previous {
                return Err(DataShapeError::OutOfOrder {
                    instrument_id: self.instrument_id.clone(),
                    previous,
                    next,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    #[test]
    fn ordered_series_passes_shape_check() {
        let s = InstrumentSeries::new(
            "005930",
            vec![DailyBar::close_only(d(4), 10), DailyBar::close_only(d(5), 11)],
        );
        assert!(s.check_shape().is_ok());
        assert_eq!(s.first_date(), Some(d(4)));
        assert_eq!(s.last_date(), Some(d(5)));
    }

    #[test]
    fn duplicate_dates_are_rejected() {
        let s = InstrumentSeries::new(
            "005930",
            vec![DailyBar::close_only(d(4), 10), DailyBar::close_only(d(4), 11)],
        );
        assert!(matches!(
            s.check_shape(),
            Err(DataShapeError::DuplicateDate { .. })
        ));
    }

    #[test]
    fn descending_dates_are_rejected() {
        let s = InstrumentSeries::new(
            "005930",
            vec![DailyBar::close_only(d(5), 10), DailyBar::close_only(d(4), 11)],
        );
        assert!(matches!(
            s.check_shape(),
            Err(DataShapeError::OutOfOrder { .. })
        ));
    }

    #[test]
    fn empty_series_is_rejected() {
        let s = InstrumentSeries::new("005930", vec![]);
        assert!(matches!(s.check_shape(), Err(DataShapeError::Empty { .. })));
    }
}
