//! Feature records: a standardized bar extended with indicator values.

use super::bar::DailyBar;
use serde::{Deserialize, Serialize};

/// One instrument-day of features.
///
/// Vector-valued fields are positionally aligned with the window lists of the
/// `FeatureConfig` that produced the record. `None` means the indicator is
/// undefined on that date (window not yet filled, or an input missing).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub instrument_id: String,
    pub bar: DailyBar,
    pub moving_averages: Vec<Option<f64>>,
    pub volume_moving_averages: Vec<Option<f64>>,
    pub mansfield_rs: Option<f64>,
    pub is_new_high_1y: Option<bool>,
    /// Raw multi-timeframe Mansfield values, ranked cross-sectionally later.
    pub mrs_raw: Vec<Option<f64>>,
}

/// All feature records for one instrument, in date order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentFeatures {
    pub instrument_id: String,
    pub records: Vec<FeatureRecord>,
}

impl InstrumentFeatures {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
