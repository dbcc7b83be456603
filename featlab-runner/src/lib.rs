//! FeatLab Runner: fetch orchestration, run metadata, export and validation.
//!
//! This crate builds on `featlab-core` to provide:
//! - Run configuration loaded from TOML, plus logging setup
//! - The fetch orchestrator (bounded worker pool, fail-fast cancellation)
//! - The universe feature table with cross-sectional percentile ranks
//! - Run metadata assembled on the coordinating thread
//! - Parquet and JSON artifact export
//! - Release validation of produced artifacts

pub mod config;
pub mod export;
pub mod metadata;
pub mod orchestrator;
pub mod progress;
pub mod table;
pub mod validate;

pub use config::{LogFormat, LoggingConfig, OutputConfig, ProviderConfig, RunConfig, RunConfigError};
pub use export::{export_failure, export_run, ExportError};
pub use metadata::{MetadataAssembler, RunMetadata, RunStatus};
pub use orchestrator::{FetchOrchestrator, RunError, RunErrorKind, RunFailure, RunOutput, Stage};
pub use progress::{LogProgress, NoProgress};
pub use table::{FeatureRow, FeatureTable};
pub use validate::{validate_artifacts, ValidationError, ValidationOptions, ValidationReport};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn run_config_is_send_sync() {
        assert_send::<RunConfig>();
        assert_sync::<RunConfig>();
    }

    #[test]
    fn orchestrator_is_send_sync() {
        assert_send::<FetchOrchestrator>();
        assert_sync::<FetchOrchestrator>();
    }

    #[test]
    fn run_error_is_send() {
        assert_send::<RunError>();
        assert_send::<RunFailure>();
    }

    #[test]
    fn feature_table_is_send_sync() {
        assert_send::<FeatureTable>();
        assert_sync::<FeatureTable>();
    }

    #[test]
    fn progress_reporters_are_send_sync() {
        assert_send::<LogProgress>();
        assert_sync::<LogProgress>();
        assert_send::<NoProgress>();
        assert_sync::<NoProgress>();
    }
}
