//! Stage sequencing, the run manifest, and the shared error boundary.

pub mod manifest;
pub mod runner;
pub mod stage;

pub use manifest::{FileDigest, MANIFEST_FILE_NAME, RunManifest, StageRecord, StageStatus};
pub use runner::{PipelineOutcome, PipelineRunner, StageOutput, StageOutputs};
pub use stage::StageKind;
