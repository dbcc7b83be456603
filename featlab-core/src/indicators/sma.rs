//! Simple Moving Average (SMA).
//!
//! Rolling mean of a value series over a lookback window.
//! Lookback: period - 1 (first valid value at index period-1).

use super::rolling::rolling_mean;
use super::Indicator;

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    name: String,
}

impl Sma {
    /// Price average, named `SMA_{period}`.
    pub fn new(period: usize) -> Self {
        Self::named(period, format!("SMA_{period}"))
    }

    /// Volume average, named `VMA_{period}`.
    pub fn volume(period: usize) -> Self {
        Self::named(period, format!("VMA_{period}"))
    }

    pub fn named(period: usize, name: impl Into<String>) -> Self {
        assert!(period >= 1, "SMA period must be >= 1");
        Self {
            period,
            name: name.into(),
        }
    }

}

impl Indicator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, values: &[Option<f64>]) -> Vec<Option<f64>> {
        rolling_mean(values, self.period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, some_values, DEFAULT_EPSILON};

    #[test]
    fn sma_5_basic() {
        let values = some_values(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0]);
        let result = Sma::new(5).compute(&values);

        assert_eq!(result.len(), 7);
        for (i, v) in result.iter().enumerate().take(4) {
            assert!(v.is_none(), "expected null at index {i}");
        }
        // SMA[4] = mean(10,11,12,13,14) = 12.0
        assert_approx(result[4].unwrap(), 12.0, DEFAULT_EPSILON);
        assert_approx(result[5].unwrap(), 13.0, DEFAULT_EPSILON);
        assert_approx(result[6].unwrap(), 14.0, DEFAULT_EPSILON);
    }

    #[test]
    fn sma_1_is_value() {
        let values = some_values(&[100.0, 200.0, 300.0]);
        let result = Sma::new(1).compute(&values);
        assert_eq!(result, values);
    }

    #[test]
    fn sma_null_propagation() {
        let mut values = some_values(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0]);
        values[2] = None;
        let result = Sma::new(3).compute(&values);
        // windows [10,11,-], [11,-,13], [-,13,14] are undefined
        assert!(result[2].is_none());
        assert!(result[3].is_none());
        assert!(result[4].is_none());
        assert_approx(result[5].unwrap(), 14.0, DEFAULT_EPSILON);
    }

    #[test]
    fn names_and_lookback() {
        assert_eq!(Sma::new(20).name(), "SMA_20");
        assert_eq!(Sma::volume(60).name(), "VMA_60");
        assert_eq!(Sma::new(20).lookback(), 19);
        assert_eq!(Sma::new(1).lookback(), 0);
    }
}
