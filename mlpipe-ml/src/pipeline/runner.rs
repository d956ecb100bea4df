//! Sequences the stages with one fail-fast error boundary.

use super::manifest::{MANIFEST_FILE_NAME, RunManifest};
use super::stage::StageKind;
use crate::data::{
    DataIngestion, DataTransformation, DataValidation, IngestionArtifact, SplitArtifact,
    ValidationArtifact,
};
use crate::error::MlError;
use crate::training::{EvaluationArtifact, ModelArtifact, ModelEvaluation, ModelTrainer};
use mlpipe_core::ConfigurationManager;
use std::future::Future;
use std::path::PathBuf;

/// Files a stage leaves on disk, digested into the manifest.
pub trait StageOutputs {
    fn output_files(&self) -> Vec<PathBuf>;
}

impl StageOutputs for IngestionArtifact {
    fn output_files(&self) -> Vec<PathBuf> {
        std::iter::once(self.archive.clone())
            .chain(self.extracted_files.iter().cloned())
            .collect()
    }
}

impl StageOutputs for ValidationArtifact {
    fn output_files(&self) -> Vec<PathBuf> {
        vec![self.status_file.clone(), self.report_file.clone()]
    }
}

impl StageOutputs for SplitArtifact {
    fn output_files(&self) -> Vec<PathBuf> {
        vec![self.train_path.clone(), self.test_path.clone()]
    }
}

impl StageOutputs for ModelArtifact {
    fn output_files(&self) -> Vec<PathBuf> {
        vec![self.model_path.clone()]
    }
}

impl StageOutputs for EvaluationArtifact {
    fn output_files(&self) -> Vec<PathBuf> {
        vec![self.metric_file.clone(), self.model_copy.clone()]
    }
}

/// Result of a single stage run on its own.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutput {
    Ingestion(IngestionArtifact),
    Validation(ValidationArtifact),
    Transformation(SplitArtifact),
    Training(ModelArtifact),
    Evaluation(EvaluationArtifact),
}

/// Every artifact of a full run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    pub ingestion: IngestionArtifact,
    pub validation: ValidationArtifact,
    pub split: SplitArtifact,
    pub model: ModelArtifact,
    pub evaluation: EvaluationArtifact,
    pub manifest_path: PathBuf,
}

pub struct PipelineRunner {
    manager: ConfigurationManager,
    manifest_path: PathBuf,
}

impl PipelineRunner {
    pub fn new(manager: ConfigurationManager) -> Self {
        let manifest_path = manager.artifacts_root().join(MANIFEST_FILE_NAME);
        Self {
            manager,
            manifest_path,
        }
    }

    pub fn manifest_path(&self) -> &std::path::Path {
        &self.manifest_path
    }

    /// Run all five stages in order, stopping at the first error.
    pub async fn run_all(&self) -> Result<PipelineOutcome, MlError> {
        let mut manifest = RunManifest::new();
        tracing::info!(run_id = %manifest.run_id, "Pipeline run started");

        let ingestion = self
            .guarded(&mut manifest, StageKind::Ingestion, self.ingest())
            .await?;
        let validation = self
            .guarded(&mut manifest, StageKind::Validation, async { self.validate() })
            .await?;
        let split = self
            .guarded(&mut manifest, StageKind::Transformation, async {
                self.transform()
            })
            .await?;
        let model = self
            .guarded(&mut manifest, StageKind::Training, async { self.train() })
            .await?;
        let evaluation = self
            .guarded(&mut manifest, StageKind::Evaluation, self.evaluate())
            .await?;

        manifest.mark_finished();
        manifest.save(&self.manifest_path)?;
        tracing::info!(run_id = %manifest.run_id, "Pipeline run completed");

        Ok(PipelineOutcome {
            ingestion,
            validation,
            split,
            model,
            evaluation,
            manifest_path: self.manifest_path.clone(),
        })
    }

    /// Run one stage against whatever earlier stages left on disk.
    ///
    /// The stage's record replaces any previous one in the existing manifest.
    pub async fn run_stage(&self, stage: StageKind) -> Result<StageOutput, MlError> {
        let mut manifest = RunManifest::load_or_new(&self.manifest_path)?;
        let m = &mut manifest;
        match stage {
            StageKind::Ingestion => self
                .guarded(m, stage, self.ingest())
                .await
                .map(StageOutput::Ingestion),
            StageKind::Validation => self
                .guarded(m, stage, async { self.validate() })
                .await
                .map(StageOutput::Validation),
            StageKind::Transformation => self
                .guarded(m, stage, async { self.transform() })
                .await
                .map(StageOutput::Transformation),
            StageKind::Training => self
                .guarded(m, stage, async { self.train() })
                .await
                .map(StageOutput::Training),
            StageKind::Evaluation => self
                .guarded(m, stage, self.evaluate())
                .await
                .map(StageOutput::Evaluation),
        }
    }

    /// The error boundary every stage runs inside: banner, manifest, log, propagate.
    async fn guarded<T, F>(
        &self,
        manifest: &mut RunManifest,
        stage: StageKind,
        work: F,
    ) -> Result<T, MlError>
    where
        T: StageOutputs,
        F: Future<Output = Result<T, MlError>>,
    {
        tracing::info!(">>>>>> stage {stage} started <<<<<<");
        manifest.begin(stage);
        manifest.save(&self.manifest_path)?;

        match work.await {
            Ok(output) => {
                manifest.complete(stage, &output.output_files());
                manifest.save(&self.manifest_path)?;
                tracing::info!(">>>>>> stage {stage} completed <<<<<<\n\nx==========x");
                Ok(output)
            }
            Err(e) => {
                tracing::error!(stage = %stage, error = %e, "Stage failed");
                manifest.fail(stage, &e);
                if let Err(save_err) = manifest.save(&self.manifest_path) {
                    tracing::warn!(error = %save_err, "Could not record failure in manifest");
                }
                Err(e)
            }
        }
    }

    async fn ingest(&self) -> Result<IngestionArtifact, MlError> {
        let config = self.manager.data_ingestion_config()?;
        DataIngestion::new(config)?.run().await
    }

    fn validate(&self) -> Result<ValidationArtifact, MlError> {
        let config = self.manager.data_validation_config()?;
        DataValidation::new(config).validate_all_columns()
    }

    fn transform(&self) -> Result<SplitArtifact, MlError> {
        let config = self.manager.data_transformation_config()?;
        DataTransformation::new(config).run()
    }

    fn train(&self) -> Result<ModelArtifact, MlError> {
        let config = self.manager.model_trainer_config()?;
        ModelTrainer::new(config).train()
    }

    async fn evaluate(&self) -> Result<EvaluationArtifact, MlError> {
        let config = self.manager.model_evaluation_config()?;
        ModelEvaluation::new(config)?.log_into_tracker().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ValidationStatus;
    use crate::pipeline::manifest::StageStatus;
    use crate::testutil::{linear_csv, manager_for, serve_bytes, zip_bytes};
    use tempfile::TempDir;

    const COLUMNS: [&str; 4] = ["a", "b", "c", "target"];

    #[tokio::test]
    async fn test_run_all_produces_every_artifact() {
        let dir = TempDir::new().unwrap();
        let url = serve_bytes(zip_bytes(&[("data.csv", &linear_csv(40))]), 200).await;
        let runner = PipelineRunner::new(manager_for(dir.path(), &url, &COLUMNS));

        let outcome = runner.run_all().await.unwrap();
        assert_eq!(outcome.validation.status, ValidationStatus::Passed);
        assert_eq!(outcome.split.train_rows + outcome.split.test_rows, 40);
        assert!(outcome.model.model_path.exists());
        assert!(outcome.evaluation.metrics.is_finite());

        let manifest = RunManifest::load(runner.manifest_path()).unwrap().unwrap();
        assert!(manifest.is_complete());
        assert!(manifest.finished_at.is_some());
        let split = manifest.record(StageKind::Transformation).unwrap();
        assert_eq!(split.files.len(), 2);
    }

    #[tokio::test]
    async fn test_schema_mismatch_stops_at_transformation() {
        let dir = TempDir::new().unwrap();
        let url = serve_bytes(zip_bytes(&[("data.csv", &linear_csv(20))]), 200).await;
        let runner = PipelineRunner::new(manager_for(dir.path(), &url, &["a", "b", "target"]));

        let err = runner.run_all().await.unwrap_err();
        assert!(matches!(err, MlError::SchemaRejected { .. }));

        let manifest = RunManifest::load(runner.manifest_path()).unwrap().unwrap();
        assert_eq!(
            manifest.record(StageKind::Validation).unwrap().status,
            StageStatus::Succeeded
        );
        let failed = manifest.record(StageKind::Transformation).unwrap();
        assert_eq!(failed.status, StageStatus::Failed);
        assert!(failed.error.is_some());
        assert!(manifest.record(StageKind::Training).is_none());
        assert!(manifest.finished_at.is_none());
    }

    #[tokio::test]
    async fn test_download_failure_stops_at_ingestion() {
        let dir = TempDir::new().unwrap();
        let url = serve_bytes(Vec::new(), 500).await;
        let runner = PipelineRunner::new(manager_for(dir.path(), &url, &COLUMNS));

        assert!(runner.run_all().await.is_err());
        let manifest = RunManifest::load(runner.manifest_path()).unwrap().unwrap();
        assert_eq!(manifest.stages.len(), 1);
        assert_eq!(manifest.stages[0].status, StageStatus::Failed);
    }

    #[tokio::test]
    async fn test_single_stages_share_the_manifest() {
        let dir = TempDir::new().unwrap();
        let url = serve_bytes(zip_bytes(&[("data.csv", &linear_csv(20))]), 200).await;
        let runner = PipelineRunner::new(manager_for(dir.path(), &url, &COLUMNS));

        // Transformation before validation has no status file to read.
        let err = runner
            .run_stage(StageKind::Transformation)
            .await
            .unwrap_err();
        assert!(matches!(err, MlError::StatusFile { .. }));

        for stage in [
            StageKind::Ingestion,
            StageKind::Validation,
            StageKind::Transformation,
        ] {
            runner.run_stage(stage).await.unwrap();
        }
        let output = runner.run_stage(StageKind::Training).await.unwrap();
        assert!(matches!(output, StageOutput::Training(_)));

        let manifest = RunManifest::load(runner.manifest_path()).unwrap().unwrap();
        assert_eq!(manifest.stages.len(), 4);
        assert!(
            manifest
                .stages
                .iter()
                .all(|r| r.status == StageStatus::Succeeded)
        );
    }
}
