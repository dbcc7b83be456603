//! Industry aggregation: equal-weighted industry indices per classification
//! level, with relative strength against a run-wide benchmark.

pub mod aggregate;
pub mod grouping;
pub mod index;

pub use aggregate::{
    check_levels, AggregationError, IndustryAggregator, IndustryBenchmark,
    UNIVERSE_BENCHMARK_METHOD,
};
pub use grouping::{IndustryGroup, IndustryGroups};
pub use index::{EqualWeightIndex, INDEX_BASE};
