//! Model training and evaluation.

pub mod evaluation;
pub mod metrics;
pub mod model;
pub mod trainer;

pub use evaluation::{EvaluationArtifact, ModelEvaluation};
pub use metrics::RegressionMetrics;
pub use model::{ElasticNet, RegressionModel};
pub use trainer::{ModelArtifact, ModelTrainer};
