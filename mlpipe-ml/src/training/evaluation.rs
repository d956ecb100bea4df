//! Model evaluation stage: score the test split and record a tracker run.

use crate::data::table::Table;
use crate::error::MlError;
use crate::tracking::{ExperimentTracker, RunStatus, TrackedRun, tracker_from_config};
use crate::training::metrics::RegressionMetrics;
use crate::training::model::RegressionModel;
use mlpipe_core::ModelEvaluationConfig;
use mlpipe_core::persistence::atomic_write_json;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Output of the evaluation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationArtifact {
    pub metrics: RegressionMetrics,
    pub metric_file: PathBuf,
    /// Copy of the model logged with the run.
    pub model_copy: PathBuf,
    pub tracker: String,
    pub run_id: String,
    pub test_rows: usize,
}

pub struct ModelEvaluation {
    config: ModelEvaluationConfig,
    tracker: Box<dyn ExperimentTracker>,
}

impl ModelEvaluation {
    /// Build with the tracker named in the configuration.
    pub fn new(config: ModelEvaluationConfig) -> Result<Self, MlError> {
        let tracker = tracker_from_config(&config.tracker)?;
        Ok(Self::with_tracker(config, tracker))
    }

    pub fn with_tracker(
        config: ModelEvaluationConfig,
        tracker: Box<dyn ExperimentTracker>,
    ) -> Self {
        Self { config, tracker }
    }

    /// Predict on the test split and write `{rmse, mae, r2}` to `metric_file_name`.
    pub fn evaluate(&self) -> Result<(RegressionMetrics, usize), MlError> {
        let model = RegressionModel::load(&self.config.model_path)?;
        if model.target_column != self.config.target_column {
            return Err(MlError::evaluation(format!(
                "model was trained for target '{}' but evaluation targets '{}'",
                model.target_column, self.config.target_column
            )));
        }

        let test = Table::read_csv(&self.config.test_data_path)?;
        let actual = test.numeric_column(&self.config.target_column)?;
        let predicted = model.predict_table(&test)?;
        let metrics = RegressionMetrics::compute(&actual, &predicted)?;

        atomic_write_json(&self.config.metric_file_name, &metrics)?;
        tracing::info!(
            path = %self.config.metric_file_name.display(),
            rmse = metrics.rmse,
            mae = metrics.mae,
            r2 = metrics.r2,
            "Metrics saved"
        );
        Ok((metrics, test.row_count()))
    }

    /// Evaluate, then log params, metrics, and the model under a new run.
    pub async fn log_into_tracker(&self) -> Result<EvaluationArtifact, MlError> {
        let (metrics, test_rows) = self.evaluate()?;
        let model_copy = self.copy_model()?;

        let run = self
            .tracker
            .start_run(self.config.tracker.run_name.as_deref())
            .await?;
        let logged = self.log_run(&run, &metrics, &model_copy).await;
        let status = if logged.is_ok() {
            RunStatus::Finished
        } else {
            RunStatus::Failed
        };
        let ended = self.tracker.end_run(&run, status).await;

        if let Err(e) = logged {
            if let Err(end_err) = ended {
                tracing::warn!(run_id = %run.run_id, error = %end_err, "Failed to close run");
            }
            return Err(e);
        }
        ended?;

        tracing::info!(
            tracker = self.tracker.name(),
            run_id = %run.run_id,
            "Evaluation logged"
        );
        Ok(EvaluationArtifact {
            metrics,
            metric_file: self.config.metric_file_name.clone(),
            model_copy,
            tracker: self.tracker.name().to_string(),
            run_id: run.run_id,
            test_rows,
        })
    }

    async fn log_run(
        &self,
        run: &TrackedRun,
        metrics: &RegressionMetrics,
        model_copy: &Path,
    ) -> Result<(), MlError> {
        self.tracker.log_params(run, &self.config.all_params).await?;
        self.tracker.log_metrics(run, &metrics.to_metric_map()).await?;
        self.tracker.log_artifact(run, model_copy).await
    }

    /// Place a copy of the trained model in this stage's `root_dir`.
    fn copy_model(&self) -> Result<PathBuf, MlError> {
        let file_name = self.config.model_path.file_name().ok_or_else(|| {
            MlError::evaluation(format!(
                "model path {} has no file name",
                self.config.model_path.display()
            ))
        })?;
        let dest = self.config.root_dir.join(file_name);
        if dest != self.config.model_path {
            std::fs::create_dir_all(&self.config.root_dir)?;
            std::fs::copy(&self.config.model_path, &dest)?;
        }
        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::LocalTracker;
    use crate::training::model::ElasticNet;
    use async_trait::async_trait;
    use mlpipe_core::{ElasticNetParams, TrackerConfig};
    use ndarray::array;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn setup(dir: &Path) -> ModelEvaluationConfig {
        let params = ElasticNetParams {
            alpha: 0.001,
            ..ElasticNetParams::default()
        };
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![2.0, 4.0, 6.0, 8.0];
        let model = ElasticNet::new(params.clone())
            .fit(&x, &y, vec!["x".into()], "y")
            .unwrap();
        let model_path = dir.join("model_trainer").join("model.json");
        model.save(&model_path).unwrap();

        let test_path = dir.join("test.csv");
        std::fs::write(&test_path, "y,x\n10,5\n12,6\n").unwrap();

        ModelEvaluationConfig {
            root_dir: dir.join("model_evaluation"),
            test_data_path: test_path,
            model_path,
            metric_file_name: dir.join("model_evaluation").join("metrics.json"),
            all_params: params.to_param_map(),
            target_column: "y".into(),
            tracker: TrackerConfig {
                uri: dir.join("mlruns").display().to_string(),
                experiment_name: "eval-test".into(),
                ..TrackerConfig::default()
            },
        }
    }

    #[tokio::test]
    async fn test_metrics_file_and_local_run() {
        let dir = TempDir::new().unwrap();
        let cfg = setup(dir.path());
        let evaluation = ModelEvaluation::new(cfg.clone()).unwrap();

        let artifact = evaluation.log_into_tracker().await.unwrap();
        assert!(artifact.metrics.rmse < 0.1);
        assert_eq!(artifact.test_rows, 2);
        assert_eq!(artifact.tracker, "local");

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&cfg.metric_file_name).unwrap())
                .unwrap();
        for key in ["rmse", "mae", "r2"] {
            assert!(saved[key].as_f64().unwrap().is_finite(), "{key}");
        }

        let tracker = LocalTracker::new(dir.path().join("mlruns"), "eval-test");
        let runs = tracker.runs().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].run_id, artifact.run_id);
        assert_eq!(runs[0].status, RunStatus::Finished);
        assert_eq!(tracker.params(&artifact.run_id).unwrap(), cfg.all_params);
        assert!(
            tracker
                .run_dir(&artifact.run_id)
                .join("artifacts/model.json")
                .exists()
        );
        assert!(cfg.root_dir.join("model.json").exists());
    }

    /// Accepts the run, then fails on metrics.
    struct FlakyTracker {
        ended: Arc<Mutex<Vec<RunStatus>>>,
    }

    #[async_trait]
    impl ExperimentTracker for FlakyTracker {
        fn name(&self) -> &str {
            "flaky"
        }
        async fn start_run(&self, _run_name: Option<&str>) -> Result<TrackedRun, MlError> {
            Ok(TrackedRun {
                run_id: "r1".into(),
                experiment_id: "0".into(),
                artifact_uri: String::new(),
            })
        }
        async fn log_params(
            &self,
            _run: &TrackedRun,
            _params: &BTreeMap<String, String>,
        ) -> Result<(), MlError> {
            Ok(())
        }
        async fn log_metrics(
            &self,
            _run: &TrackedRun,
            _metrics: &BTreeMap<String, f64>,
        ) -> Result<(), MlError> {
            Err(MlError::tracking("metrics rejected"))
        }
        async fn log_artifact(&self, _run: &TrackedRun, _path: &Path) -> Result<(), MlError> {
            Ok(())
        }
        async fn end_run(&self, _run: &TrackedRun, status: RunStatus) -> Result<(), MlError> {
            self.ended.lock().unwrap().push(status);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_tracker_failure_marks_run_failed_and_propagates() {
        let dir = TempDir::new().unwrap();
        let cfg = setup(dir.path());
        let ended = Arc::new(Mutex::new(Vec::new()));
        let evaluation = ModelEvaluation::with_tracker(
            cfg.clone(),
            Box::new(FlakyTracker {
                ended: ended.clone(),
            }),
        );

        let err = evaluation.log_into_tracker().await.unwrap_err();
        assert!(matches!(err, MlError::Tracking(_)));
        assert_eq!(*ended.lock().unwrap(), vec![RunStatus::Failed]);
        // Metrics are persisted before the tracker is contacted.
        assert!(cfg.metric_file_name.exists());
    }

    #[tokio::test]
    async fn test_target_mismatch_is_error() {
        let dir = TempDir::new().unwrap();
        let mut cfg = setup(dir.path());
        cfg.target_column = "price".into();
        let err = ModelEvaluation::new(cfg).unwrap().evaluate().unwrap_err();
        assert!(matches!(err, MlError::Evaluation(_)));
    }

    #[test]
    fn test_missing_model_is_not_found() {
        let dir = TempDir::new().unwrap();
        let mut cfg = setup(dir.path());
        cfg.model_path = dir.path().join("absent.json");
        let err = ModelEvaluation::new(cfg).unwrap().evaluate().unwrap_err();
        assert!(matches!(err, MlError::NotFound(_)));
    }
}
