//! Data ingestion: download the source archive once, then extract it.

use crate::error::MlError;
use mlpipe_core::DataIngestionConfig;
use mlpipe_core::persistence::atomic_write;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Whether the archive was fetched on this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadOutcome {
    Downloaded { bytes: u64 },
    AlreadyPresent,
}

/// Output of the ingestion stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionArtifact {
    pub archive: PathBuf,
    pub download: DownloadOutcome,
    pub unzip_dir: PathBuf,
    pub extracted_files: Vec<PathBuf>,
}

/// Downloads and unpacks the raw dataset.
pub struct DataIngestion {
    config: DataIngestionConfig,
    client: reqwest::Client,
}

impl DataIngestion {
    pub fn new(config: DataIngestionConfig) -> Result<Self, MlError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("mlpipe/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &DataIngestionConfig {
        &self.config
    }

    /// Fetch `source_url` into `local_data_file` unless that file already exists.
    ///
    /// Presence alone decides; contents are not compared. The body is written
    /// atomically so an interrupted transfer never counts as present.
    pub async fn download_file(&self) -> Result<DownloadOutcome, MlError> {
        let target = &self.config.local_data_file;
        if target.exists() {
            tracing::info!(path = %target.display(), "File already exists");
            return Ok(DownloadOutcome::AlreadyPresent);
        }

        let response = self
            .client
            .get(&self.config.source_url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| MlError::ingestion(format!("Download failed: {e}")))?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();
        let bytes = response.bytes().await?;
        atomic_write(target, &bytes)?;

        tracing::info!(
            url = %self.config.source_url,
            path = %target.display(),
            bytes = bytes.len(),
            content_type = %content_type,
            "File downloaded"
        );
        Ok(DownloadOutcome::Downloaded {
            bytes: bytes.len() as u64,
        })
    }

    /// Extract `local_data_file` into `unzip_dir`, creating it if needed.
    ///
    /// Entries whose names would land outside `unzip_dir` are skipped.
    pub fn extract_zip_file(&self) -> Result<Vec<PathBuf>, MlError> {
        extract_archive(&self.config.local_data_file, &self.config.unzip_dir)
    }

    /// Download (if absent) and extract.
    pub async fn run(&self) -> Result<IngestionArtifact, MlError> {
        let download = self.download_file().await?;
        let extracted_files = self.extract_zip_file()?;
        Ok(IngestionArtifact {
            archive: self.config.local_data_file.clone(),
            download,
            unzip_dir: self.config.unzip_dir.clone(),
            extracted_files,
        })
    }
}

fn extract_archive(archive_path: &Path, unzip_dir: &Path) -> Result<Vec<PathBuf>, MlError> {
    std::fs::create_dir_all(unzip_dir)?;
    let file = File::open(archive_path).map_err(|e| {
        MlError::ingestion(format!(
            "Failed to open archive {}: {e}",
            archive_path.display()
        ))
    })?;
    let mut archive = zip::ZipArchive::new(file)?;

    let mut extracted = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            tracing::warn!(entry = entry.name(), "Skipping archive entry outside target dir");
            continue;
        };
        let out_path = unzip_dir.join(relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&out_path)?;
        std::io::copy(&mut entry, &mut out)?;
        extracted.push(out_path);
    }

    tracing::info!(
        path = %unzip_dir.display(),
        files = extracted.len(),
        "Extracted files"
    );
    Ok(extracted)
}
