//! Data provider trait and structured error types.
//!
//! The DataProvider trait abstracts over acquisition backends (exchange
//! libraries, local files, test fakes) so the orchestrator never knows which
//! backend it is driving.

use crate::domain::InstrumentMaster;
use chrono::NaiveDate;
use polars::prelude::DataFrame;
use std::collections::HashMap;
use thiserror::Error;

/// Provider-shaped series, before standardization.
///
/// Column names, dtypes, ordering and duplicates are whatever the backend
/// produced; the standardizer owns turning this into an `InstrumentSeries`.
pub type RawSeries = DataFrame;

/// Instrument universe as listed by a provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Universe {
    pub instrument_ids: Vec<String>,
    pub market_by_instrument: HashMap<String, String>,
}

impl Universe {
    pub fn len(&self) -> usize {
        self.instrument_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instrument_ids.is_empty()
    }
}

/// Structured error types for provider operations.
///
/// Opaque to the orchestrator: any variant is fatal to a run. Retrying, if
/// any, happens inside the provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("instrument not found: {instrument_id}")]
    InstrumentNotFound { instrument_id: String },

    #[error("instrument master unavailable: {0}")]
    MasterUnavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("provider error: {0}")]
    Other(String),
}

/// Trait for acquisition backends.
///
/// Implementations must be shareable across worker threads. A backend that is
/// not safe to call concurrently is still `Sync` in Rust terms (it serializes
/// internally); such backends should be driven with a worker count of 1.
pub trait DataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Instrument ids in the universe, optionally as of a date and filtered to
    /// one market, plus the market label of each.
    fn list_instruments(
        &self,
        as_of: Option<NaiveDate>,
        market: Option<&str>,
    ) -> Result<Universe, ProviderError>;

    /// Static reference rows for every instrument the provider knows.
    fn load_instrument_master(
        &self,
        as_of: Option<NaiveDate>,
    ) -> Result<Vec<InstrumentMaster>, ProviderError>;

    /// Raw daily series for one instrument over an inclusive date range.
    fn fetch_series(
        &self,
        instrument_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        adjusted: bool,
    ) -> Result<RawSeries, ProviderError>;
}

/// Progress callback for multi-instrument runs.
///
/// Called from worker threads; implementations must not block.
pub trait FetchProgress: Send + Sync {
    /// Called when a task begins acquiring an instrument.
    fn on_start(&self, instrument_id: &str, index: usize, total: usize);

    /// Called when an instrument's task finishes, successfully or not.
    fn on_complete(&self, instrument_id: &str, completed: usize, total: usize, ok: bool);

    /// Called once when the fan-out ends.
    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize);
}
