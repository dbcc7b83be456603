//! Progress reporting for the per-instrument fan-out.

use featlab_core::FetchProgress;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Logs progress through `tracing`: per-instrument events at debug, a
/// heartbeat at info every `every` completions.
#[derive(Debug)]
pub struct LogProgress {
    every: usize,
    last_logged: AtomicUsize,
}

impl LogProgress {
    pub fn new(every: usize) -> Self {
        Self {
            every: every.max(1),
            last_logged: AtomicUsize::new(0),
        }
    }
}

impl Default for LogProgress {
    fn default() -> Self {
        Self::new(100)
    }
}

impl FetchProgress for LogProgress {
    fn on_start(&self, instrument_id: &str, index: usize, total: usize) {
        tracing::debug!(instrument = instrument_id, index, total, "fetch started");
    }

    fn on_complete(&self, instrument_id: &str, completed: usize, total: usize, ok: bool) {
        if !ok {
            tracing::warn!(instrument = instrument_id, completed, total, "instrument failed");
            return;
        }
        tracing::debug!(instrument = instrument_id, completed, total, "instrument done");
        let bucket = completed / self.every;
        if completed == total || self.last_logged.fetch_max(bucket, Ordering::Relaxed) < bucket {
            tracing::info!(completed, total, "fetch progress");
        }
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize) {
        tracing::info!(succeeded, failed, total, "fetch fan-out finished");
    }
}

/// Discards all progress events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl FetchProgress for NoProgress {
    fn on_start(&self, _instrument_id: &str, _index: usize, _total: usize) {}
    fn on_complete(&self, _instrument_id: &str, _completed: usize, _total: usize, _ok: bool) {}
    fn on_batch_complete(&self, _succeeded: usize, _failed: usize, _total: usize) {}
}
