use super::instrument::IndustryLevel;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One (date, level, industry) row of the industry feature table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndustryFeatureRecord {
    pub date: NaiveDate,
    pub level: IndustryLevel,
    pub industry_large: String,
    pub industry_mid: String,
    pub industry_small: String,
    pub industry_key: String,
    /// Equal-weighted index level, 100 on the first date of the industry grid.
    pub industry_close: f64,
    pub industry_return: f64,
    /// Constituents with a defined daily return on this date.
    pub constituent_count: u32,
    pub mansfield_rs: Option<f64>,
    pub mrs_raw: Vec<Option<f64>>,
}
