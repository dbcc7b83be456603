//! Per-instrument indicators.
//!
//! Every indicator is computed over a whole series at once and returns one
//! value per input row, `None` where the indicator is undefined.

pub mod engine;
pub mod mansfield;
pub mod new_high;
pub mod rank;
pub mod rolling;
pub mod sma;

pub use engine::IndicatorEngine;
pub use mansfield::{mansfield_from_ratios, BenchmarkCloses};
pub use new_high::new_high_flags;
pub use rank::percentile_ranks;
pub use rolling::{rolling_max, rolling_mean};
pub use sma::Sma;

/// A single-series rolling indicator.
pub trait Indicator: Send + Sync {
    /// Output column name.
    fn name(&self) -> &str;

    /// Rows before the first defined value.
    fn lookback(&self) -> usize;

    fn compute(&self, values: &[Option<f64>]) -> Vec<Option<f64>>;
}

/// Wrap plain values as present observations.
#[cfg(test)]
pub fn some_values(values: &[f64]) -> Vec<Option<f64>> {
    values.iter().map(|&v| Some(v)).collect()
}

/// Create a synthetic standardized series from close prices for testing.
///
/// Consecutive calendar days from 2024-01-02; open = previous close,
/// high/low bracket open and close by 1, volume = 1000.
#[cfg(test)]
pub fn make_series(instrument_id: &str, closes: &[f64]) -> crate::domain::InstrumentSeries {
    use crate::domain::{DailyBar, InstrumentSeries};
    let base_date = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    let bars = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let close = close.round() as i64;
            let open = if i == 0 { close } else { closes[i - 1].round() as i64 };
            DailyBar {
                date: base_date + chrono::Duration::days(i as i64),
                open: Some(open),
                high: Some(open.max(close) + 1),
                low: Some(open.min(close) - 1),
                close,
                volume: Some(1000),
                trading_value: None,
                change: None,
            }
        })
        .collect();
    InstrumentSeries::new(instrument_id, bars)
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
