//! Experiment tracking: runs, params, metrics, and artifacts.
//!
//! [`tracker_from_config`] picks the backend from the configured URI:
//! `http://` and `https://` talk to an MLflow tracking server, `file://` and
//! bare paths record runs on the local filesystem.

pub mod local;
pub mod mlflow;

pub use local::{LocalRunRecord, LocalTracker};
pub use mlflow::{MlflowCredentials, MlflowTracker};

use crate::error::MlError;
use async_trait::async_trait;
use mlpipe_core::TrackerConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Terminal state of a tracker run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to an open run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedRun {
    pub run_id: String,
    pub experiment_id: String,
    /// Where the backend stores this run's artifacts.
    pub artifact_uri: String,
}

/// A backend that records runs.
///
/// Every call after `start_run` takes the returned handle. Callers close the
/// run with `end_run` whether or not the intermediate calls succeeded.
#[async_trait]
pub trait ExperimentTracker: Send + Sync {
    fn name(&self) -> &str;

    async fn start_run(&self, run_name: Option<&str>) -> Result<TrackedRun, MlError>;

    async fn log_params(
        &self,
        run: &TrackedRun,
        params: &BTreeMap<String, String>,
    ) -> Result<(), MlError>;

    async fn log_metrics(
        &self,
        run: &TrackedRun,
        metrics: &BTreeMap<String, f64>,
    ) -> Result<(), MlError>;

    /// Upload a single file under the run's artifact root.
    async fn log_artifact(&self, run: &TrackedRun, path: &Path) -> Result<(), MlError>;

    async fn end_run(&self, run: &TrackedRun, status: RunStatus) -> Result<(), MlError>;
}

/// Where a tracker URI points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerTarget {
    Mlflow(url::Url),
    Local(PathBuf),
}

impl TrackerTarget {
    pub fn parse(uri: &str) -> Result<Self, MlError> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(MlError::invalid_input("tracker uri is empty"));
        }
        match url::Url::parse(uri) {
            Ok(url) => match url.scheme() {
                "http" | "https" => Ok(Self::Mlflow(url)),
                "file" => url.to_file_path().map(Self::Local).map_err(|_| {
                    MlError::invalid_input(format!("tracker uri {uri} is not a local path"))
                }),
                // A one-letter scheme is a Windows drive letter, not a scheme.
                scheme if scheme.len() == 1 => Ok(Self::Local(PathBuf::from(uri))),
                scheme => Err(MlError::invalid_input(format!(
                    "unsupported tracker uri scheme '{scheme}'"
                ))),
            },
            Err(url::ParseError::RelativeUrlWithoutBase) => Ok(Self::Local(PathBuf::from(uri))),
            Err(e) => Err(MlError::invalid_input(format!(
                "invalid tracker uri {uri}: {e}"
            ))),
        }
    }
}

/// Build the tracker named by `config.uri`.
///
/// Credentials are resolved here, once, and handed to the client; nothing is
/// written to the process environment.
pub fn tracker_from_config(config: &TrackerConfig) -> Result<Box<dyn ExperimentTracker>, MlError> {
    match TrackerTarget::parse(&config.uri)? {
        TrackerTarget::Mlflow(url) => {
            let credentials = MlflowCredentials::resolve(config)?;
            tracing::info!(
                uri = %url,
                experiment = %config.experiment_name,
                authenticated = credentials.is_some(),
                "Using MLflow tracker"
            );
            Ok(Box::new(MlflowTracker::new(
                url,
                &config.experiment_name,
                credentials,
            )?))
        }
        TrackerTarget::Local(root) => {
            tracing::info!(
                root = %root.display(),
                experiment = %config.experiment_name,
                "Using local tracker"
            );
            Ok(Box::new(LocalTracker::new(root, &config.experiment_name)))
        }
    }
}
