//! Schema validation and the status gate that guards downstream stages.
//!
//! Validation never fails on a schema mismatch; it records the outcome in a
//! status file (`Validation status: True|False`). The transformation stage
//! reads that file through [`StatusGate`] and refuses to run unless the last
//! token is literally `True`.

use crate::data::schema::{ColumnType, SchemaComparison, SchemaDefinition, infer_column_type};
use crate::data::table::Table;
use crate::error::MlError;
use mlpipe_core::DataValidationConfig;
use mlpipe_core::persistence::{atomic_write, atomic_write_json};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Rows sampled per column for dtype inference.
const DTYPE_SAMPLE_ROWS: usize = 100;

/// Outcome persisted by the validation stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Passed,
    Failed,
}

impl ValidationStatus {
    pub fn from_bool(passed: bool) -> Self {
        if passed { Self::Passed } else { Self::Failed }
    }

    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    /// The line written to the status file.
    pub fn status_line(&self) -> String {
        let flag = if self.is_passed() { "True" } else { "False" };
        format!("Validation status: {flag}")
    }

    /// Parse a status file body by its last whitespace-delimited token.
    pub fn parse(content: &str) -> Option<Self> {
        match content.split_whitespace().last()? {
            "True" => Some(Self::Passed),
            "False" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Turn a failed status into [`MlError::SchemaRejected`].
    pub fn ensure_passed(self, status_file: &Path) -> Result<(), MlError> {
        if self.is_passed() {
            Ok(())
        } else {
            Err(MlError::SchemaRejected {
                status_file: status_file.to_path_buf(),
            })
        }
    }
}

/// Reads the status file written by validation.
#[derive(Debug, Clone)]
pub struct StatusGate {
    status_file: PathBuf,
}

impl StatusGate {
    pub fn new(status_file: impl Into<PathBuf>) -> Self {
        Self {
            status_file: status_file.into(),
        }
    }

    pub fn status_file(&self) -> &Path {
        &self.status_file
    }

    /// Read the recorded status.
    ///
    /// A missing, unreadable, or malformed file is an error rather than an
    /// implicit pass or fail.
    pub fn check(&self) -> Result<ValidationStatus, MlError> {
        let content = std::fs::read_to_string(&self.status_file).map_err(|e| {
            MlError::status_file(&self.status_file, format!("cannot be read: {e}"))
        })?;
        ValidationStatus::parse(&content).ok_or_else(|| {
            MlError::status_file(
                &self.status_file,
                format!("expected a trailing True/False token, found {:?}", content.trim()),
            )
        })
    }

    /// Succeed only when validation passed.
    pub fn require_passed(&self) -> Result<(), MlError> {
        let status = self.check()?;
        tracing::debug!(status = ?status, path = %self.status_file.display(), "Status gate read");
        status.ensure_passed(&self.status_file)
    }
}

/// A column whose observed values disagree with its declared dtype.
///
/// Informational only; dtypes never affect the validation status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DtypeObservation {
    pub column: String,
    pub expected: String,
    pub inferred: String,
}

/// Detailed validation outcome, saved next to the status file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub status: ValidationStatus,
    pub data_file: PathBuf,
    pub row_count: usize,
    pub comparison: SchemaComparison,
    pub dtype_observations: Vec<DtypeObservation>,
    pub validated_at: chrono::DateTime<chrono::Utc>,
}

/// Output of the validation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationArtifact {
    pub status: ValidationStatus,
    pub status_file: PathBuf,
    pub report_file: PathBuf,
    pub comparison: SchemaComparison,
}

/// Checks the extracted table against the expected schema.
pub struct DataValidation {
    config: DataValidationConfig,
    schema: SchemaDefinition,
}

impl DataValidation {
    pub fn new(config: DataValidationConfig) -> Self {
        let schema = SchemaDefinition::from_dtype_map(&config.columns);
        Self { config, schema }
    }

    pub fn schema(&self) -> &SchemaDefinition {
        &self.schema
    }

    /// Compare column names against the schema and write the status file.
    pub fn validate_all_columns(&self) -> Result<ValidationArtifact, MlError> {
        let table = Table::read_csv(&self.config.data_file)?;
        let comparison = self.schema.compare(&table.columns);
        let status = ValidationStatus::from_bool(comparison.is_match());

        if !comparison.missing.is_empty() {
            tracing::warn!(missing = ?comparison.missing, "Expected columns missing");
        }
        if !comparison.unexpected.is_empty() {
            tracing::warn!(unexpected = ?comparison.unexpected, "Columns not in schema");
        }
        if !comparison.duplicated.is_empty() {
            tracing::warn!(duplicated = ?comparison.duplicated, "Repeated column names");
        }

        atomic_write(&self.config.status_file, status.status_line().as_bytes())?;

        let report = ValidationReport {
            status,
            data_file: self.config.data_file.clone(),
            row_count: table.row_count(),
            comparison: comparison.clone(),
            dtype_observations: self.observe_dtypes(&table),
            validated_at: chrono::Utc::now(),
        };
        let report_file = self.report_path();
        atomic_write_json(&report_file, &report)?;

        tracing::info!(
            status = %status.status_line(),
            path = %self.config.status_file.display(),
            "Validation status written"
        );
        Ok(ValidationArtifact {
            status,
            status_file: self.config.status_file.clone(),
            report_file,
            comparison,
        })
    }

    fn report_path(&self) -> PathBuf {
        self.config
            .status_file
            .parent()
            .map(|p| p.join("report.json"))
            .unwrap_or_else(|| self.config.root_dir.join("report.json"))
    }

    fn observe_dtypes(&self, table: &Table) -> Vec<DtypeObservation> {
        let mut observations = Vec::new();
        for (idx, column) in table.columns.iter().enumerate() {
            let Some(expected) = self.schema.dtype_of(column) else {
                continue;
            };
            let inferred = infer_column_type(
                table
                    .rows
                    .iter()
                    .take(DTYPE_SAMPLE_ROWS)
                    .filter_map(|row| row.get(idx).map(String::as_str)),
            );
            // Integer-valued floats are still floats to the schema.
            let compatible = expected == inferred
                || (expected == ColumnType::Float64 && inferred == ColumnType::Int64);
            if !compatible {
                observations.push(DtypeObservation {
                    column: column.clone(),
                    expected: expected.as_dtype().to_string(),
                    inferred: inferred.as_dtype().to_string(),
                });
            }
        }
        observations
    }
}
