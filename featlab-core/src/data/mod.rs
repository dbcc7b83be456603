//! Data acquisition and standardization

pub mod local;
pub mod master;
pub mod provider;
pub mod schema;
pub mod standardize;

pub use local::LocalFileProvider;
pub use master::{load_master_json, parse_master_json};
pub use provider::{DataProvider, FetchProgress, ProviderError, RawSeries, Universe};
pub use schema::{SchemaError, SeriesSchema};
pub use standardize::Standardizer;
