//! # mlpipe-ml
//!
//! The stages of the mlpipe training pipeline and the pieces they share.
//!
//! A run is a fixed sequence: ingestion downloads and unpacks the dataset,
//! validation checks its columns and writes a status flag, transformation
//! refuses to run unless that flag says `True` and then splits the rows,
//! training fits an ElasticNet regressor, and evaluation scores it and
//! records a tracker run. [`pipeline::PipelineRunner`] drives the sequence
//! and keeps a manifest of what each stage produced.

pub mod data;
pub mod error;
pub mod pipeline;
pub mod tracking;
pub mod training;

pub use error::MlError;
pub use pipeline::{PipelineOutcome, PipelineRunner, RunManifest, StageKind, StageOutput};
pub use tracking::{ExperimentTracker, RunStatus, tracker_from_config};

#[cfg(test)]
pub(crate) mod testutil;
