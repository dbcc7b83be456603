//! DailyBar: one standardized trading day for one instrument.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One trading day after standardization.
///
/// Prices are integral currency units. Every field except `date` and `close`
/// may be null when the upstream feed omitted it or it could not be coerced;
/// rows without a close never survive standardization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: Option<i64>,
    pub high: Option<i64>,
    pub low: Option<i64>,
    pub close: i64,
    pub volume: Option<i64>,
    pub trading_value: Option<i64>,
    /// Percent change reported by the feed.
    pub change: Option<f64>,
}

impl DailyBar {
    /// A bar with only a close, as produced by feeds that publish closes alone.
    pub fn close_only(date: NaiveDate, close: i64) -> Self {
        Self {
            date,
            open: None,
            high: None,
            low: None,
            close,
            volume: None,
            trading_value: None,
            change: None,
        }
    }

    pub fn close_f64(&self) -> f64 {
        self.close as f64
    }

    pub fn volume_f64(&self) -> Option<f64> {
        self.volume.map(|v| v as f64)
    }

    /// Basic OHLC sanity check: high >= low and the close inside the range.
    ///
    /// Bars missing any of open/high/low are considered sane; there is
    /// nothing to contradict.
    pub fn is_sane(&self) -> bool {
        match (self.open, self.high, self.low) {
            (Some(open), Some(high), Some(low)) => {
                high >= low
                    && high >= open
                    && high >= self.close
                    && low <= open
                    && low <= self.close
                    && self.close > 0
            }
            _ => self.close > 0,
        }
    }
}
