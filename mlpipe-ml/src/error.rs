//! Error types for the mlpipe-ml crate.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for pipeline stages.
#[derive(Debug, Error)]
pub enum MlError {
    #[error("Ingestion error: {0}")]
    Ingestion(String),

    #[error("Dataset error: {0}")]
    Dataset(String),

    /// The validation stage recorded a schema mismatch; downstream stages must not run.
    #[error("Data schema is not valid (status file: {status_file})")]
    SchemaRejected { status_file: PathBuf },

    #[error("Status file {path} unusable: {reason}")]
    StatusFile { path: PathBuf, reason: String },

    #[error("Training error: {0}")]
    Training(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Tracking error: {0}")]
    Tracking(String),

    #[error("Configuration error: {0}")]
    Config(#[from] mlpipe_core::ConfigError),

    #[error("Secret error: {0}")]
    Secret(#[from] mlpipe_core::SecretResolveError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl MlError {
    pub fn ingestion(msg: impl Into<String>) -> Self {
        Self::Ingestion(msg.into())
    }

    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }

    pub fn tracking(msg: impl Into<String>) -> Self {
        Self::Tracking(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn status_file(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::StatusFile {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
