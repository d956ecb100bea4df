//! # mlpipe-core
//!
//! Foundation library for the mlpipe training pipeline.
//! Provides layered configuration (pipeline paths, hyperparameters, dataset
//! schema), typed per-stage configuration records, secret references for
//! tracker credentials, and atomic file persistence.

pub mod config;
pub mod error;
pub mod persistence;
pub mod secret_ref;

// Re-export commonly used types at the crate root.
pub use config::{
    ConfigPaths, ConfigurationManager, DataIngestionConfig, DataTransformationConfig,
    DataValidationConfig, ElasticNetParams, ModelEvaluationConfig, ModelTrainerConfig,
    TrackerConfig,
};
pub use error::ConfigError;
pub use secret_ref::{SecretRef, SecretResolveError, SecretSource};
