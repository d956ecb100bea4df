//! Run manifest: the on-disk record of what each stage did and produced.
//!
//! Saved to `<artifacts_root>/manifest.json` after every stage, including a
//! failing one, so a later process can see where the last run stopped and
//! which files it left behind.

use super::stage::StageKind;
use crate::error::MlError;
use chrono::{DateTime, Utc};
use mlpipe_core::persistence::{atomic_write_json, load_json, sha256_file};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE_NAME: &str = "manifest.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Running,
    Succeeded,
    Failed,
}

/// A file a stage produced, with its digest at the time the stage finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDigest {
    pub path: PathBuf,
    pub sha256: String,
    pub bytes: u64,
}

impl FileDigest {
    pub fn of(path: &Path) -> std::io::Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            sha256: sha256_file(path)?,
            bytes: std::fs::metadata(path)?.len(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: StageKind,
    pub status: StageStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    #[serde(default)]
    pub files: Vec<FileDigest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stages: Vec<StageRecord>,
}

impl Default for RunManifest {
    fn default() -> Self {
        Self::new()
    }
}

impl RunManifest {
    pub fn new() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            finished_at: None,
            stages: Vec::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Option<Self>, MlError> {
        Ok(load_json(path)?)
    }

    /// The manifest at `path`, or a fresh one if none was written yet.
    pub fn load_or_new(path: &Path) -> Result<Self, MlError> {
        Ok(Self::load(path)?.unwrap_or_default())
    }

    pub fn save(&self, path: &Path) -> Result<(), MlError> {
        atomic_write_json(path, self)?;
        Ok(())
    }

    pub fn record(&self, stage: StageKind) -> Option<&StageRecord> {
        self.stages.iter().find(|r| r.stage == stage)
    }

    /// Mark `stage` as running, replacing any earlier record of it.
    pub fn begin(&mut self, stage: StageKind) {
        let record = StageRecord {
            stage,
            status: StageStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            error: None,
            files: Vec::new(),
        };
        match self.stages.iter_mut().find(|r| r.stage == stage) {
            Some(existing) => *existing = record,
            None => self.stages.push(record),
        }
        self.stages.sort_by_key(|r| r.stage);
    }

    /// Mark `stage` as succeeded and digest the files it produced.
    ///
    /// Files that have vanished are left out with a warning.
    pub fn complete(&mut self, stage: StageKind, files: &[PathBuf]) {
        let digests = files
            .iter()
            .filter_map(|path| match FileDigest::of(path) {
                Ok(digest) => Some(digest),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Cannot digest stage output"
                    );
                    None
                }
            })
            .collect();
        self.finish(stage, StageStatus::Succeeded, None, digests);
    }

    pub fn fail(&mut self, stage: StageKind, error: &MlError) {
        self.finish(stage, StageStatus::Failed, Some(error.to_string()), Vec::new());
    }

    fn finish(
        &mut self,
        stage: StageKind,
        status: StageStatus,
        error: Option<String>,
        files: Vec<FileDigest>,
    ) {
        if self.record(stage).is_none() {
            self.begin(stage);
        }
        if let Some(record) = self.stages.iter_mut().find(|r| r.stage == stage) {
            record.status = status;
            record.finished_at = Some(Utc::now());
            record.error = error;
            record.files = files;
        }
    }

    pub fn mark_finished(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// True when every stage has a successful record.
    pub fn is_complete(&self) -> bool {
        StageKind::ALL.iter().all(|k| {
            self.record(*k)
                .is_some_and(|r| r.status == StageStatus::Succeeded)
        })
    }
}
