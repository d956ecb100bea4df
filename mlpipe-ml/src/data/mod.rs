//! Data stages: ingestion, validation, transformation, and the table they share.

pub mod ingest;
pub mod schema;
pub mod table;
pub mod transform;
pub mod validate;

pub use ingest::{DataIngestion, DownloadOutcome, IngestionArtifact};
pub use schema::{ColumnType, SchemaComparison, SchemaDefinition};
pub use table::Table;
pub use transform::{DataTransformation, SplitArtifact, train_test_split};
pub use validate::{DataValidation, StatusGate, ValidationArtifact, ValidationStatus};
