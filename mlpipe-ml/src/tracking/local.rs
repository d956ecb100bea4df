//! Filesystem tracker.
//!
//! Layout: `<root>/<experiment>/<run_id>/{run.json, params.json, metrics.json, artifacts/}`.

use super::{ExperimentTracker, RunStatus, TrackedRun};
use crate::error::MlError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mlpipe_core::persistence::{atomic_write_json, load_json};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const RUN_FILE: &str = "run.json";
const PARAMS_FILE: &str = "params.json";
const METRICS_FILE: &str = "metrics.json";
const ARTIFACTS_DIR: &str = "artifacts";

/// Contents of `run.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalRunRecord {
    pub run_id: String,
    pub experiment_name: String,
    pub run_name: Option<String>,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

pub struct LocalTracker {
    root: PathBuf,
    experiment_name: String,
}

impl LocalTracker {
    pub fn new(root: impl Into<PathBuf>, experiment_name: &str) -> Self {
        Self {
            root: root.into(),
            experiment_name: experiment_name.to_string(),
        }
    }

    /// Directory holding every run of this tracker's experiment.
    pub fn experiment_dir(&self) -> PathBuf {
        self.root.join(sanitize(&self.experiment_name))
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.experiment_dir().join(run_id)
    }

    /// All recorded runs of the experiment, oldest first.
    pub fn runs(&self) -> Result<Vec<LocalRunRecord>, MlError> {
        let dir = self.experiment_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut runs = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path().join(RUN_FILE);
            if let Some(record) = load_json::<LocalRunRecord>(&path)? {
                runs.push(record);
            }
        }
        runs.sort_by_key(|r| r.start_time);
        Ok(runs)
    }

    pub fn params(&self, run_id: &str) -> Result<BTreeMap<String, String>, MlError> {
        Ok(load_json(&self.run_dir(run_id).join(PARAMS_FILE))?.unwrap_or_default())
    }

    pub fn metrics(&self, run_id: &str) -> Result<BTreeMap<String, f64>, MlError> {
        Ok(load_json(&self.run_dir(run_id).join(METRICS_FILE))?.unwrap_or_default())
    }

    fn load_record(&self, run: &TrackedRun) -> Result<LocalRunRecord, MlError> {
        load_json(&self.run_dir(&run.run_id).join(RUN_FILE))?
            .ok_or_else(|| MlError::tracking(format!("unknown run {}", run.run_id)))
    }
}

/// Keep experiment names usable as a single directory component.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect();
    match cleaned.trim() {
        "" | "." | ".." => "Default".to_string(),
        trimmed => trimmed.to_string(),
    }
}

#[async_trait]
impl ExperimentTracker for LocalTracker {
    fn name(&self) -> &str {
        "local"
    }

    async fn start_run(&self, run_name: Option<&str>) -> Result<TrackedRun, MlError> {
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let run_dir = self.run_dir(&run_id);
        std::fs::create_dir_all(run_dir.join(ARTIFACTS_DIR))?;

        let record = LocalRunRecord {
            run_id: run_id.clone(),
            experiment_name: self.experiment_name.clone(),
            run_name: run_name.map(str::to_string),
            status: RunStatus::Running,
            start_time: Utc::now(),
            end_time: None,
        };
        atomic_write_json(&run_dir.join(RUN_FILE), &record)?;

        tracing::debug!(run_id = %run_id, dir = %run_dir.display(), "Local run started");
        Ok(TrackedRun {
            run_id,
            experiment_id: sanitize(&self.experiment_name),
            artifact_uri: run_dir.join(ARTIFACTS_DIR).display().to_string(),
        })
    }

    async fn log_params(
        &self,
        run: &TrackedRun,
        params: &BTreeMap<String, String>,
    ) -> Result<(), MlError> {
        let path = self.run_dir(&run.run_id).join(PARAMS_FILE);
        let mut all: BTreeMap<String, String> = load_json(&path)?.unwrap_or_default();
        all.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        atomic_write_json(&path, &all)?;
        Ok(())
    }

    async fn log_metrics(
        &self,
        run: &TrackedRun,
        metrics: &BTreeMap<String, f64>,
    ) -> Result<(), MlError> {
        let path = self.run_dir(&run.run_id).join(METRICS_FILE);
        let mut all: BTreeMap<String, f64> = load_json(&path)?.unwrap_or_default();
        all.extend(metrics.iter().map(|(k, v)| (k.clone(), *v)));
        atomic_write_json(&path, &all)?;
        Ok(())
    }

    async fn log_artifact(&self, run: &TrackedRun, path: &Path) -> Result<(), MlError> {
        let file_name = path
            .file_name()
            .ok_or_else(|| MlError::tracking(format!("{} has no file name", path.display())))?;
        let dest = self
            .run_dir(&run.run_id)
            .join(ARTIFACTS_DIR)
            .join(file_name);
        std::fs::copy(path, &dest)?;
        tracing::debug!(artifact = %dest.display(), "Artifact logged");
        Ok(())
    }

    async fn end_run(&self, run: &TrackedRun, status: RunStatus) -> Result<(), MlError> {
        let mut record = self.load_record(run)?;
        record.status = status;
        record.end_time = Some(Utc::now());
        atomic_write_json(&self.run_dir(&run.run_id).join(RUN_FILE), &record)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_full_run_lifecycle() {
        let dir = TempDir::new().unwrap();
        let tracker = LocalTracker::new(dir.path(), "house-prices");

        let run = tracker.start_run(Some("baseline")).await.unwrap();
        tracker
            .log_params(&run, &BTreeMap::from([("alpha".into(), "0.5".into())]))
            .await
            .unwrap();
        tracker
            .log_params(&run, &BTreeMap::from([("l1_ratio".into(), "0.1".into())]))
            .await
            .unwrap();
        tracker
            .log_metrics(&run, &BTreeMap::from([("rmse".into(), 1.5)]))
            .await
            .unwrap();

        let model = dir.path().join("model.json");
        std::fs::write(&model, "{}").unwrap();
        tracker.log_artifact(&run, &model).await.unwrap();
        tracker.end_run(&run, RunStatus::Finished).await.unwrap();

        let runs = tracker.runs().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Finished);
        assert_eq!(runs[0].run_name.as_deref(), Some("baseline"));
        assert!(runs[0].end_time.is_some());

        assert_eq!(
            tracker.params(&run.run_id).unwrap(),
            BTreeMap::from([
                ("alpha".to_string(), "0.5".to_string()),
                ("l1_ratio".to_string(), "0.1".to_string()),
            ])
        );
        assert_eq!(tracker.metrics(&run.run_id).unwrap()["rmse"], 1.5);
        assert!(
            tracker
                .run_dir(&run.run_id)
                .join("artifacts")
                .join("model.json")
                .exists()
        );
    }

    #[tokio::test]
    async fn test_each_start_is_a_new_run() {
        let dir = TempDir::new().unwrap();
        let tracker = LocalTracker::new(dir.path(), "exp");
        let a = tracker.start_run(None).await.unwrap();
        let b = tracker.start_run(None).await.unwrap();
        assert_ne!(a.run_id, b.run_id);
        assert_eq!(tracker.runs().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_end_unknown_run_fails() {
        let dir = TempDir::new().unwrap();
        let tracker = LocalTracker::new(dir.path(), "exp");
        let run = TrackedRun {
            run_id: "missing".into(),
            experiment_id: "exp".into(),
            artifact_uri: String::new(),
        };
        let err = tracker.end_run(&run, RunStatus::Failed).await.unwrap_err();
        assert!(matches!(err, MlError::Tracking(_)));
    }

    #[test]
    fn test_sanitize_experiment_name() {
        assert_eq!(sanitize("a/b:c"), "a_b_c");
        assert_eq!(sanitize(".."), "Default");
        assert_eq!(sanitize("Default"), "Default");
    }

    #[test]
    fn test_no_runs_yet() {
        let dir = TempDir::new().unwrap();
        assert!(LocalTracker::new(dir.path(), "exp").runs().unwrap().is_empty());
    }
}
