//! Shared persistence utilities: atomic file writes, JSON load/save, digests.
//!
//! Every stage hands its output to the next one through the filesystem, so a
//! half-written artifact must never be observable at its final path.

use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};

/// Atomically write JSON data to a file.
///
/// Serializes `data` to pretty-printed JSON, writes it to a temporary sibling,
/// then renames it onto `path`. Creates parent directories if they don't exist.
pub fn atomic_write_json<T: serde::Serialize>(path: &Path, data: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(data).map_err(io::Error::other)?;
    atomic_write(path, json.as_bytes())
}

/// Atomically write raw bytes to a file.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp = tmp_sibling(path);
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Temporary sibling path: `data.zip` becomes `data.zip.tmp`.
///
/// The full file name is kept so `train.csv` and `train.json` never share a
/// temporary file.
pub fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Load and deserialize JSON from a file.
///
/// Returns `Ok(None)` if the file doesn't exist.
pub fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> io::Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)?;
    let value =
        serde_json::from_str(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(Some(value))
}

/// Create each directory (and its parents) if missing.
pub fn create_directories<P: AsRef<Path>>(paths: &[P]) -> io::Result<()> {
    for path in paths {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;
        tracing::debug!(path = %path.display(), "Directory ready");
    }
    Ok(())
}

/// SHA-256 of a file's contents, hex encoded.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let content = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&content);
    Ok(format!("{:x}", hasher.finalize()))
}
