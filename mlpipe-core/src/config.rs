//! Configuration management for mlpipe.
//!
//! A pipeline is described by three YAML files:
//! - `config/config.yaml`: artifact paths, the source URL, and the tracker endpoint
//! - `params.yaml`: model hyperparameters
//! - `schema.yaml`: expected columns and the target column
//!
//! Uses `figment` for layered configuration: built-in defaults -> YAML file ->
//! environment (`MLPIPE_DATA_INGESTION__SOURCE_URL`, ...). The
//! [`ConfigurationManager`] turns the parsed files into one immutable,
//! typed record per stage.

use crate::error::ConfigError;
use crate::persistence::create_directories;
use crate::secret_ref::SecretRef;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_PATH: &str = "config/config.yaml";
pub const PARAMS_FILE_PATH: &str = "params.yaml";
pub const SCHEMA_FILE_PATH: &str = "schema.yaml";
pub const DEFAULT_ARTIFACTS_ROOT: &str = "artifacts";
/// Prefix of environment overrides for `config.yaml` keys.
pub const ENV_PREFIX: &str = "MLPIPE_";

/// Locations of the three configuration files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigPaths {
    pub config: PathBuf,
    pub params: PathBuf,
    pub schema: PathBuf,
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self {
            config: PathBuf::from(CONFIG_FILE_PATH),
            params: PathBuf::from(PARAMS_FILE_PATH),
            schema: PathBuf::from(SCHEMA_FILE_PATH),
        }
    }
}

impl ConfigPaths {
    /// Default file locations resolved against a workspace directory.
    pub fn in_workspace(workspace: &Path) -> Self {
        Self {
            config: workspace.join(CONFIG_FILE_PATH),
            params: workspace.join(PARAMS_FILE_PATH),
            schema: workspace.join(SCHEMA_FILE_PATH),
        }
    }
}

// ---------------------------------------------------------------------------
// config.yaml
// ---------------------------------------------------------------------------

/// Contents of `config.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory every stage writes beneath; also holds the run manifest.
    pub artifacts_root: PathBuf,
    pub data_ingestion: IngestionSection,
    pub data_validation: ValidationSection,
    pub data_transformation: TransformationSection,
    pub model_trainer: TrainerSection,
    pub model_evaluation: EvaluationSection,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::with_artifacts_root(DEFAULT_ARTIFACTS_ROOT)
    }
}

impl PipelineConfig {
    /// The default layout with every stage directory beneath `root`.
    pub fn with_artifacts_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            data_ingestion: IngestionSection::under(&root),
            data_validation: ValidationSection::under(&root),
            data_transformation: TransformationSection::under(&root),
            model_trainer: TrainerSection::under(&root),
            model_evaluation: EvaluationSection::under(&root),
            artifacts_root: root,
        }
    }
}

/// `data_ingestion` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionSection {
    pub root_dir: PathBuf,
    /// Remote ZIP archive to download.
    pub source_url: String,
    /// Where the archive is stored; its presence skips the download.
    pub local_data_file: PathBuf,
    pub unzip_dir: PathBuf,
}

impl Default for IngestionSection {
    fn default() -> Self {
        Self::under(Path::new(DEFAULT_ARTIFACTS_ROOT))
    }
}

impl IngestionSection {
    fn under(root: &Path) -> Self {
        let dir = root.join("data_ingestion");
        Self {
            source_url: String::new(),
            local_data_file: dir.join("data.zip"),
            unzip_dir: dir.clone(),
            root_dir: dir,
        }
    }
}

/// `data_validation` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSection {
    pub root_dir: PathBuf,
    /// The extracted table to validate.
    pub data_file: PathBuf,
    /// Status flag read by the transformation stage.
    pub status_file: PathBuf,
}

impl Default for ValidationSection {
    fn default() -> Self {
        Self::under(Path::new(DEFAULT_ARTIFACTS_ROOT))
    }
}

impl ValidationSection {
    fn under(root: &Path) -> Self {
        let dir = root.join("data_validation");
        Self {
            data_file: root.join("data_ingestion").join("data.csv"),
            status_file: dir.join("status.txt"),
            root_dir: dir,
        }
    }
}

/// `data_transformation` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformationSection {
    pub root_dir: PathBuf,
    pub data_path: PathBuf,
    /// Fraction of rows assigned to the test split.
    pub test_size: f64,
    /// Shuffle seed. Unset means a fresh, non-reproducible split every run.
    pub seed: Option<u64>,
}

impl Default for TransformationSection {
    fn default() -> Self {
        Self::under(Path::new(DEFAULT_ARTIFACTS_ROOT))
    }
}

impl TransformationSection {
    fn under(root: &Path) -> Self {
        Self {
            root_dir: root.join("data_transformation"),
            data_path: root.join("data_ingestion").join("data.csv"),
            test_size: 0.25,
            seed: None,
        }
    }
}

/// `model_trainer` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerSection {
    pub root_dir: PathBuf,
    pub train_data_path: PathBuf,
    pub test_data_path: PathBuf,
    /// File name of the serialized model inside `root_dir`.
    pub model_name: String,
}

impl Default for TrainerSection {
    fn default() -> Self {
        Self::under(Path::new(DEFAULT_ARTIFACTS_ROOT))
    }
}

impl TrainerSection {
    fn under(root: &Path) -> Self {
        let split = root.join("data_transformation");
        Self {
            root_dir: root.join("model_trainer"),
            train_data_path: split.join("train.csv"),
            test_data_path: split.join("test.csv"),
            model_name: "model.json".to_string(),
        }
    }
}

/// `model_evaluation` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationSection {
    pub root_dir: PathBuf,
    pub test_data_path: PathBuf,
    pub model_path: PathBuf,
    pub metric_file_name: PathBuf,
    pub tracker: TrackerConfig,
}

impl Default for EvaluationSection {
    fn default() -> Self {
        Self::under(Path::new(DEFAULT_ARTIFACTS_ROOT))
    }
}

impl EvaluationSection {
    fn under(root: &Path) -> Self {
        let dir = root.join("model_evaluation");
        Self {
            test_data_path: root.join("data_transformation").join("test.csv"),
            model_path: root.join("model_trainer").join("model.json"),
            metric_file_name: dir.join("metrics.json"),
            root_dir: dir,
            tracker: TrackerConfig::default(),
        }
    }
}

/// Experiment tracker endpoint and credentials.
///
/// `uri` selects the backend: `http(s)://` talks to an MLflow server,
/// `file://` or a bare path records runs on the local filesystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub uri: String,
    pub experiment_name: String,
    pub username: SecretRef,
    pub password: SecretRef,
    /// Optional display name attached to each run.
    pub run_name: Option<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            uri: "mlruns".to_string(),
            experiment_name: "Default".to_string(),
            username: SecretRef::env("MLFLOW_TRACKING_USERNAME"),
            password: SecretRef::env("MLFLOW_TRACKING_PASSWORD"),
            run_name: None,
        }
    }
}

// ---------------------------------------------------------------------------
// params.yaml
// ---------------------------------------------------------------------------

/// Contents of `params.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamsConfig {
    pub elastic_net: ElasticNetParams,
}

/// ElasticNet hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElasticNetParams {
    /// Overall regularization strength.
    pub alpha: f64,
    /// Mix between L1 (1.0) and L2 (0.0) penalties.
    pub l1_ratio: f64,
    pub max_iter: usize,
    pub tol: f64,
}

impl Default for ElasticNetParams {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            l1_ratio: 0.5,
            max_iter: 1000,
            tol: 1e-4,
        }
    }
}

impl ElasticNetParams {
    /// Hyperparameters as string pairs, the shape trackers log them in.
    pub fn to_param_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("alpha".to_string(), self.alpha.to_string()),
            ("l1_ratio".to_string(), self.l1_ratio.to_string()),
            ("max_iter".to_string(), self.max_iter.to_string()),
            ("tol".to_string(), self.tol.to_string()),
        ])
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.alpha.is_nan() || self.alpha < 0.0 {
            return Err(ConfigError::invalid(format!(
                "elastic_net.alpha must be >= 0, got {}",
                self.alpha
            )));
        }
        if !(0.0..=1.0).contains(&self.l1_ratio) {
            return Err(ConfigError::invalid(format!(
                "elastic_net.l1_ratio must be within [0, 1], got {}",
                self.l1_ratio
            )));
        }
        if self.max_iter == 0 {
            return Err(ConfigError::invalid("elastic_net.max_iter must be > 0"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// schema.yaml
// ---------------------------------------------------------------------------

/// Contents of `schema.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Expected column name -> dtype name (`float64`, `int64`, `object`, ...).
    pub columns: BTreeMap<String, String>,
    pub target_column: TargetColumn,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetColumn {
    pub name: String,
}

// ---------------------------------------------------------------------------
// Stage records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct DataIngestionConfig {
    pub root_dir: PathBuf,
    pub source_url: String,
    pub local_data_file: PathBuf,
    pub unzip_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataValidationConfig {
    pub root_dir: PathBuf,
    pub data_file: PathBuf,
    pub status_file: PathBuf,
    pub columns: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataTransformationConfig {
    pub root_dir: PathBuf,
    pub data_path: PathBuf,
    /// The validation stage's status flag; transformation is gated on it.
    pub status_file: PathBuf,
    pub test_size: f64,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelTrainerConfig {
    pub root_dir: PathBuf,
    pub train_data_path: PathBuf,
    pub test_data_path: PathBuf,
    pub model_name: String,
    pub params: ElasticNetParams,
    pub target_column: String,
}

impl ModelTrainerConfig {
    pub fn model_path(&self) -> PathBuf {
        self.root_dir.join(&self.model_name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelEvaluationConfig {
    pub root_dir: PathBuf,
    pub test_data_path: PathBuf,
    pub model_path: PathBuf,
    pub metric_file_name: PathBuf,
    /// Every training hyperparameter, logged with the run.
    pub all_params: BTreeMap<String, String>,
    pub target_column: String,
    pub tracker: TrackerConfig,
}

// ---------------------------------------------------------------------------
// ConfigurationManager
// ---------------------------------------------------------------------------

/// Builds the per-stage configuration records from the three YAML files.
#[derive(Debug, Clone)]
pub struct ConfigurationManager {
    config: PipelineConfig,
    params: ParamsConfig,
    schema: SchemaConfig,
}

impl ConfigurationManager {
    /// Load all three files and create the artifacts root.
    ///
    /// `config.yaml` may additionally be overridden from `MLPIPE_`-prefixed
    /// environment variables, with `__` separating nested keys.
    pub fn new(paths: &ConfigPaths) -> Result<Self, ConfigError> {
        let manager = Self::load(paths)?;
        create_directories(&[&manager.config.artifacts_root])?;
        Ok(manager)
    }

    /// Load and validate all three files without touching the filesystem.
    pub fn load(paths: &ConfigPaths) -> Result<Self, ConfigError> {
        let config = load_pipeline(&paths.config)?;
        let params: ParamsConfig = load_yaml(&paths.params)?;
        let schema: SchemaConfig = load_yaml(&paths.schema)?;
        params.elastic_net.validate()?;
        Ok(Self {
            config,
            params,
            schema,
        })
    }

    /// Build from already-parsed parts and create the artifacts root.
    pub fn from_parts(
        config: PipelineConfig,
        params: ParamsConfig,
        schema: SchemaConfig,
    ) -> Result<Self, ConfigError> {
        params.elastic_net.validate()?;
        create_directories(&[&config.artifacts_root])?;
        Ok(Self {
            config,
            params,
            schema,
        })
    }

    pub fn pipeline(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn params(&self) -> &ParamsConfig {
        &self.params
    }

    pub fn schema(&self) -> &SchemaConfig {
        &self.schema
    }

    pub fn artifacts_root(&self) -> &Path {
        &self.config.artifacts_root
    }

    pub fn data_ingestion_config(&self) -> Result<DataIngestionConfig, ConfigError> {
        let section = &self.config.data_ingestion;
        if section.source_url.trim().is_empty() {
            return Err(ConfigError::missing("data_ingestion.source_url"));
        }
        create_directories(&[&section.root_dir])?;
        Ok(DataIngestionConfig {
            root_dir: section.root_dir.clone(),
            source_url: section.source_url.clone(),
            local_data_file: section.local_data_file.clone(),
            unzip_dir: section.unzip_dir.clone(),
        })
    }

    pub fn data_validation_config(&self) -> Result<DataValidationConfig, ConfigError> {
        let section = &self.config.data_validation;
        if self.schema.columns.is_empty() {
            return Err(ConfigError::missing("schema.columns"));
        }
        create_directories(&[&section.root_dir])?;
        Ok(DataValidationConfig {
            root_dir: section.root_dir.clone(),
            data_file: section.data_file.clone(),
            status_file: section.status_file.clone(),
            columns: self.schema.columns.clone(),
        })
    }

    pub fn data_transformation_config(&self) -> Result<DataTransformationConfig, ConfigError> {
        let section = &self.config.data_transformation;
        create_directories(&[&section.root_dir])?;
        Ok(DataTransformationConfig {
            root_dir: section.root_dir.clone(),
            data_path: section.data_path.clone(),
            status_file: self.config.data_validation.status_file.clone(),
            test_size: section.test_size,
            seed: section.seed,
        })
    }

    pub fn model_trainer_config(&self) -> Result<ModelTrainerConfig, ConfigError> {
        let section = &self.config.model_trainer;
        create_directories(&[&section.root_dir])?;
        Ok(ModelTrainerConfig {
            root_dir: section.root_dir.clone(),
            train_data_path: section.train_data_path.clone(),
            test_data_path: section.test_data_path.clone(),
            model_name: section.model_name.clone(),
            params: self.params.elastic_net.clone(),
            target_column: self.target_column()?,
        })
    }

    pub fn model_evaluation_config(&self) -> Result<ModelEvaluationConfig, ConfigError> {
        let section = &self.config.model_evaluation;
        if section.tracker.uri.trim().is_empty() {
            return Err(ConfigError::missing("model_evaluation.tracker.uri"));
        }
        create_directories(&[&section.root_dir])?;
        Ok(ModelEvaluationConfig {
            root_dir: section.root_dir.clone(),
            test_data_path: section.test_data_path.clone(),
            model_path: section.model_path.clone(),
            metric_file_name: section.metric_file_name.clone(),
            all_params: self.params.elastic_net.to_param_map(),
            target_column: self.target_column()?,
            tracker: section.tracker.clone(),
        })
    }

    /// Render the resolved configuration as YAML. Inline credentials are masked.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        #[derive(Serialize)]
        struct Resolved<'a> {
            config: &'a PipelineConfig,
            params: &'a ParamsConfig,
            schema: &'a SchemaConfig,
        }
        let mut config = self.config.clone();
        let tracker = &mut config.model_evaluation.tracker;
        tracker.username = tracker.username.redacted();
        tracker.password = tracker.password.redacted();
        Ok(serde_yaml::to_string(&Resolved {
            config: &config,
            params: &self.params,
            schema: &self.schema,
        })?)
    }

    fn target_column(&self) -> Result<String, ConfigError> {
        let name = self.schema.target_column.name.trim();
        if name.is_empty() {
            return Err(ConfigError::missing("schema.target_column.name"));
        }
        Ok(name.to_string())
    }
}

fn ensure_exists(path: &Path) -> Result<(), ConfigError> {
    if path.exists() {
        Ok(())
    } else {
        Err(ConfigError::FileNotFound {
            path: path.to_path_buf(),
        })
    }
}

/// Read a YAML file through figment.
fn load_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    ensure_exists(path)?;
    let value = Figment::new()
        .merge(Yaml::file(path))
        .extract()
        .map_err(Box::new)?;
    tracing::info!(path = %path.display(), "YAML file loaded");
    Ok(value)
}

/// Read `config.yaml` with env overrides on top of a layout rooted at the
/// configured `artifacts_root`.
///
/// The root is resolved first, so stage paths the file leaves out land under
/// it rather than under the built-in `artifacts/`.
fn load_pipeline(path: &Path) -> Result<PipelineConfig, ConfigError> {
    #[derive(Deserialize)]
    struct Root {
        #[serde(default)]
        artifacts_root: Option<PathBuf>,
    }

    ensure_exists(path)?;
    let overrides = || {
        Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    };
    let root: Root = overrides().extract().map_err(Box::new)?;
    let root = root
        .artifacts_root
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACTS_ROOT));

    let config: PipelineConfig =
        Figment::from(Serialized::defaults(PipelineConfig::with_artifacts_root(&root)))
            .merge(overrides())
            .extract()
            .map_err(Box::new)?;
    tracing::info!(
        path = %path.display(),
        artifacts_root = %config.artifacts_root.display(),
        "YAML file loaded"
    );
    Ok(config)
}
