//! Domain types: daily bars, instrument series, master data, feature rows.

pub mod bar;
pub mod feature;
pub mod industry;
pub mod instrument;
pub mod series;

pub use bar::DailyBar;
pub use feature::{FeatureRecord, InstrumentFeatures};
pub use industry::IndustryFeatureRecord;
pub use instrument::{
    normalize_code, normalize_industry, IndustryLabels, IndustryLevel, InstrumentMaster,
    CODE_WIDTH, FUND_MARKET, UNKNOWN_INDUSTRY,
};
pub use series::{DataShapeError, InstrumentSeries};
