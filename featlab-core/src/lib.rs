//! FeatLab Core: domain types, provider contract and feature algorithms.
//!
//! This crate contains everything that turns raw daily series into features:
//! - Domain types (bars, series, master rows, feature and industry records)
//! - The `DataProvider` contract, master JSON parsing and a local-file provider
//! - The standardizer (raw provider frames to canonical series)
//! - The indicator engine (moving averages, Mansfield RS, one-year highs)
//! - The industry aggregator (equal-weighted indices per classification level)
//!
//! Orchestration, export and validation live in `featlab-runner`.

pub mod config;
pub mod data;
pub mod domain;
pub mod indicators;
pub mod industry;

pub use config::{ConfigError, FeatureConfig, MrsWindow};
pub use data::{DataProvider, FetchProgress, ProviderError, RawSeries, SchemaError, Standardizer, Universe};
pub use domain::{
    DailyBar, DataShapeError, FeatureRecord, IndustryFeatureRecord, IndustryLevel,
    InstrumentFeatures, InstrumentMaster, InstrumentSeries,
};
pub use indicators::{BenchmarkCloses, IndicatorEngine};
pub use industry::{AggregationError, IndustryAggregator, IndustryBenchmark};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything shared across worker threads is
    /// Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<InstrumentSeries>();
        require_sync::<InstrumentSeries>();
        require_send::<InstrumentFeatures>();
        require_sync::<InstrumentFeatures>();
        require_send::<InstrumentMaster>();
        require_sync::<InstrumentMaster>();
        require_send::<BenchmarkCloses>();
        require_sync::<BenchmarkCloses>();
        require_send::<IndicatorEngine>();
        require_sync::<IndicatorEngine>();
        require_send::<IndustryAggregator>();
        require_sync::<IndustryAggregator>();
        require_send::<FeatureConfig>();
        require_sync::<FeatureConfig>();

        // Errors cross the worker channel.
        require_send::<ProviderError>();
        require_send::<SchemaError>();
        require_send::<DataShapeError>();
    }

    /// The provider contract is object-safe and shareable.
    #[test]
    fn provider_trait_object_is_shareable() {
        fn _check(p: std::sync::Arc<dyn DataProvider>) -> std::sync::Arc<dyn DataProvider> {
            let q = p.clone();
            std::thread::spawn(move || drop(q));
            p
        }
    }
}
