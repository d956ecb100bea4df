//! Model training stage.

use crate::data::table::Table;
use crate::error::MlError;
use crate::training::model::ElasticNet;
use mlpipe_core::ModelTrainerConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Output of the training stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub model_path: PathBuf,
    pub feature_names: Vec<String>,
    pub target_column: String,
    pub train_rows: usize,
    pub n_iter: usize,
    pub converged: bool,
}

pub struct ModelTrainer {
    config: ModelTrainerConfig,
}

impl ModelTrainer {
    pub fn new(config: ModelTrainerConfig) -> Self {
        Self { config }
    }

    /// Fit ElasticNet on the training split and save it to `root_dir/model_name`.
    pub fn train(&self) -> Result<ModelArtifact, MlError> {
        let train = Table::read_csv(&self.config.train_data_path)?;
        let estimator = ElasticNet::new(self.config.params.clone());
        let model = estimator.fit_table(&train, &self.config.target_column)?;

        let model_path = self.config.model_path();
        model.save(&model_path)?;

        tracing::info!(
            path = %model_path.display(),
            rows = train.row_count(),
            features = model.feature_names.len(),
            alpha = self.config.params.alpha,
            l1_ratio = self.config.params.l1_ratio,
            n_iter = model.n_iter,
            "Model trained and saved"
        );
        Ok(ModelArtifact {
            model_path,
            feature_names: model.feature_names,
            target_column: model.target_column,
            train_rows: train.row_count(),
            n_iter: model.n_iter,
            converged: model.converged,
        })
    }
}
